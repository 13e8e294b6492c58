pub mod apdu;
pub mod reader;
pub mod transcript;
pub mod transport;
pub mod utils;
