// draftbench - orchestration and consistency analysis for multi-step
// generation/evaluation experiments against LLM oracles
// Library exports

pub mod cli;
pub mod config;
pub mod consistency;
pub mod diff;
pub mod graph;
pub mod lexical;
pub mod oracle;
pub mod pipeline;
pub mod protocol;
pub mod providers;
pub mod usage;
