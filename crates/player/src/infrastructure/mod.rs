pub mod message_translator;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
