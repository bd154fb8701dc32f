pub mod conversion;
pub mod protocol;

pub use protocol::*;

pub mod v1 {
    tonic::include_proto!("constellation.v1");
}
