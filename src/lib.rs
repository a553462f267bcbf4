pub mod libs {
    pub mod codec;
    pub mod common;
    pub mod console;
    pub mod error;
    pub mod executor;
    pub mod filter_names;
    pub mod interactive;
    pub mod mem_io;
    pub mod output;
    pub mod session;
    pub mod target;
    pub mod target_control;
    pub mod transport;
}
