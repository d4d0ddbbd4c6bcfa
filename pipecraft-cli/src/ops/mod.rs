mod attach;
mod create;
mod output;
mod run;

pub use attach::attach_fifos;
pub use create::create_fifos;
pub use output::OutputFormat;
pub use run::run_command;
