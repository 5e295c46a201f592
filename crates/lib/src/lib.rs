//! Nutribot core library: config, LINE channel, completion client, topic policy, bot, and
//! webhook gateway, used by the `nutribot` CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod policy;
