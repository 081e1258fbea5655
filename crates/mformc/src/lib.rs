pub mod builtin_modules;
pub mod compile;
pub mod compress;
pub mod constants;
pub mod context;
pub mod defines;
pub mod diagnostics;
pub mod directive;
pub mod expr;
pub mod fetch;
pub mod language;
pub mod lint;
pub mod namespace;
pub mod project;
pub mod render;
pub mod resolve;
pub mod scan;
pub mod selftest;
pub mod source;
pub mod template;
