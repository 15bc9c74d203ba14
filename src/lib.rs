#![crate_name = "tapegen"]

#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod exec_request;
pub mod tape_base;
pub mod tape_compiler;
pub mod tape_vm;

/*
Tape map of a generated background-removal program (default layout)
        00000   syscall frame   execve, 3 cell-pointer args (14 bytes)
        01000   string table    "/usr/bin/curl", "curl", "-fsS", ...
        02000   argv table      11 native pointers, last one null
        02100   envp table      1 null pointer
*/
