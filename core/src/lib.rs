pub mod logbuf;
pub mod rpc;
