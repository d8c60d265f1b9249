pub mod database;
pub mod gateway;
pub mod health;
pub mod memory;
pub mod rbmq;
pub mod template;
