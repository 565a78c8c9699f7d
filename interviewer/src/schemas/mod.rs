pub mod completion_request;
pub mod completion_result;
