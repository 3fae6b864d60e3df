pub mod backoff;
pub mod blob;
pub mod engine;
pub mod manifest;
pub mod paths;
pub mod source;
#[cfg(test)]
mod testing;
