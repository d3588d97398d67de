mod test_server;

#[allow(unused_imports)]
pub use test_server::{Part, TEST_PASSWORD, TestResponse, TestServer, sample_gpx};
