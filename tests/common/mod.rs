pub(crate) mod block_store;

pub(crate) mod crypto;

pub(crate) mod logging;

pub(crate) mod membership;

pub(crate) mod network;
