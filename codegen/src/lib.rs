//! WebAssembly function-body code generation for the sunbeam baseline
//! compiler.
//!
//! Given a stream of validated WebAssembly bytecode for one function, the
//! generator emits position-dependent x86-64 machine code while
//! maintaining a typed operand stack of lazily materialized values, a
//! local-variable cache that keeps hot locals in registers, and a
//! per-bank register allocator. Inter-function call sites and trap sites
//! are recorded as link-site lists for the module linker to patch.
//!
//! Functions are compiled independently: a [`Func`] owns everything it
//! mutates, and the module metadata it reads is shared immutably, so
//! separate functions may compile on separate threads.

pub mod codegen;
pub mod error;
pub mod func;
pub mod links;
pub mod loader;
pub mod opcodes;
pub mod operand;
pub mod regalloc;
pub mod types;
pub mod varstate;

mod masm;

pub use error::CodegenError;
pub use func::{CompiledFunc, Func, Module};
pub use loader::Loader;
pub use types::{Sig, Type};

/// Compile one function body against the module's metadata.
pub fn compile_function<'m>(
    module: Module<'m>,
    sig: &'m Sig,
    body: &[u8],
    text_limit: usize,
) -> Result<CompiledFunc, CodegenError> {
    let mut f = Func::new(module, sig, text_limit);
    let mut load = Loader::new(body);
    codegen::gen_function(&mut f, &mut load)?;
    Ok(f.finish())
}
