mod common;

mod chroma_provider;
mod guard;
#[cfg(unix)]
mod lifecycle;
mod properties;
mod reconnect;
