pub mod agent;
pub mod errors;
pub mod extract;
pub mod knowledge;
pub mod mcp;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod router;
pub mod specialists;
pub mod systems;
pub mod team;
