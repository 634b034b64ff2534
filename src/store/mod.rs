mod readonly;

pub use readonly::ReadOnly;
