pub(crate) mod bootstrap;
pub(crate) mod connection;
pub(crate) mod loop_runner;
