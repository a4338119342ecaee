//! Response middleware.

pub(crate) mod headers;
