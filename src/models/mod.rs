pub mod action;
pub mod captured;
pub mod element;
pub mod locator;
pub mod requests;
pub mod responses;
pub mod session;

pub use action::*;
pub use captured::*;
pub use element::*;
pub use locator::*;
pub use requests::*;
pub use responses::*;
pub use session::*;
