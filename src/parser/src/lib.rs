mod error;
mod parser;

pub use error::ParserError;
pub use parser::{
    AddReference, AddSample, Cli, Closest, ClusterSample, Commands, Common, Export, History,
    InputFormat, RemoveSample, SnpAddressArgs, Within,
};
