pub mod dispatch;
pub mod health;
pub mod instruction;
pub mod request;
pub mod response;
pub mod retry;
pub mod status;
pub mod validation;
