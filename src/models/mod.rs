pub mod enums;
pub mod envelope;
pub mod photo;
pub mod record;

pub use enums::*;
pub use envelope::*;
pub use photo::*;
pub use record::*;
