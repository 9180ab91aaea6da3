pub mod conversation;
pub mod model;
pub mod pending_action;
pub mod role;
pub mod sub_agent;
