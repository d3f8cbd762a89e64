pub mod bill;
pub mod catalogue;
pub mod centre;
pub mod enums;
pub mod filters;
pub mod package_sale;
pub mod patient;
pub mod session;
pub mod template;
pub mod therapist;

pub use bill::*;
pub use catalogue::*;
pub use centre::*;
pub use enums::*;
pub use filters::*;
pub use package_sale::*;
pub use patient::*;
pub use session::*;
pub use template::*;
pub use therapist::*;
