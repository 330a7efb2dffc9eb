pub mod primitives;
pub use primitives::*;

pub mod config;
pub mod connection;
pub mod link;
pub mod macros;
pub mod packet;
pub mod result;

fn main() {
    tracing_subscriber::fmt::init();
    println!("Hello, world!");
}
