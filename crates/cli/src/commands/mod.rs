pub(crate) mod backfill;
pub(crate) mod migrate;
pub(crate) mod provision_user;
pub(crate) mod redact;
pub(crate) mod serve;
pub(crate) mod smoke_test;
pub(crate) mod validate;
