//! These models represent the objects passed around by the agent
//!
//! There are three related formats we need to interact with:
//! - chat endpoint requests/responses, sent between the front end and the server
//! - openai messages/tools, sent from the agent to the LLM
//! - tool-provider requests, sent from the agent to the systems providing capabilities
//!
//! These overlap but do not match exactly, so incoming data is converted into
//! the internal structs immediately at the boundary.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
