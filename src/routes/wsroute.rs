pub use crate::websocket::handlers::ws_handler;
