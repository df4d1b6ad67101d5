#![crate_name = "scriptforge"]

#[macro_use]
extern crate lazy_static;

pub mod backend;
