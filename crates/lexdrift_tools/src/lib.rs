#![forbid(unsafe_code)]

pub mod cli;
pub mod corpus_io;
