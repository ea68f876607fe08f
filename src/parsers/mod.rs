pub mod attendance;
pub mod endpoint;
pub mod login_form;
