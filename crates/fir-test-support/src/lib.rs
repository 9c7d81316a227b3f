// fir-test-support: a small in-process WebSocket client for exercising a
// `fir` socket session end to end, the way a browser would.

pub mod mock_ws_client;

pub use mock_ws_client::MockWsClient;
