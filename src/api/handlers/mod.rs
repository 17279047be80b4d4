pub mod rpc_handler;
