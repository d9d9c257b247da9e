//! Reusable pieces that are not specific to any one stream format

pub mod stack;
