//! Command routing: the §4.4 `sendCommand` contract, precondition gate,
//! `tools/list` capability aggregation, and fuzzy agent selection.

pub mod capability;
pub mod command;
pub mod precondition;
pub mod selection;

pub use capability::{ aggregate_tools, built_in_catalog };
pub use command::{ redispatch_queue, send_command, CommandContext };
pub use precondition::check as check_precondition;
pub use selection::{ calculate_similarity, normalize, select_agent, ScoredAgent, SelectionOutcome };
