pub mod correlation;
pub mod dispatcher;
pub mod message_builder;
pub mod poller;
pub mod status_parser;
pub mod template_engine;
