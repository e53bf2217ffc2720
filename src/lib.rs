pub mod message;
pub mod resolver;
pub mod sequence;
pub mod topic;
