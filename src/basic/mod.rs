pub mod equations;
pub mod error;
pub mod initializer;
pub mod jacobian;
pub mod loadflow;
pub mod network;
pub mod newtonpf;
pub mod observer;
pub mod outerloop;
pub mod post_processing;
pub mod solver;
