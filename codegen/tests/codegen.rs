//! End-to-end code generation checks: compile small function bodies and
//! inspect the emitted machine code with an independent disassembler.

use iced_x86::{Decoder, DecoderOptions, Instruction, Mnemonic, OpKind};
use sunbeam_codegen::{compile_function, CompiledFunc, Module, Sig, Type};

const TEXT_LIMIT: usize = 4096;

fn module() -> Module<'static> {
    Module {
        func_sigs: &[],
        sigs: &[],
        func_addrs: &[],
        table_funcs: &[],
        globals: &[],
    }
}

fn compile(module: Module<'_>, sig: &Sig, body: &[u8]) -> CompiledFunc {
    let _ = env_logger::builder().is_test(true).try_init();
    let out = compile_function(module, sig, body, TEXT_LIMIT).expect("compilation failed");
    assert!(out.encode_errors.is_empty(), "{:?}", out.encode_errors);
    out
}

/// Decode the whole text; every byte must belong to a valid instruction.
fn disassemble(text: &[u8]) -> Vec<Instruction> {
    let mut decoder = Decoder::with_ip(64, text, 0, DecoderOptions::NONE);
    let mut out = Vec::new();
    while decoder.can_decode() {
        let instr = decoder.decode();
        assert!(
            !instr.is_invalid(),
            "invalid instruction at {:#x} in {:02x?}",
            instr.ip(),
            text,
        );
        out.push(instr);
    }
    out
}

fn mnemonics(text: &[u8]) -> Vec<Mnemonic> {
    disassemble(text).iter().map(|i| i.mnemonic()).collect()
}

#[test]
fn const_drop_emits_no_value_code() {
    // i32.const 42; drop
    let sig = Sig::new(vec![], None);
    let body = [0x00, 0x41, 42, 0x1a, 0x0b];
    let out = compile(module(), &sig, &body);
    assert!(out.text.len() <= 7, "{:02x?}", out.text);
    assert_eq!(*out.text.last().unwrap(), 0xc3);
}

#[test]
fn cached_local_addition_uses_no_loads() {
    // (param i32) (result i32): get_local 0; get_local 0; i32.add
    let sig = Sig::new(vec![Type::I32], Some(Type::I32));
    let body = [0x00, 0x20, 0x00, 0x20, 0x00, 0x6a, 0x0b];
    let out = compile(module(), &sig, &body);

    for instr in disassemble(&out.text) {
        for i in 0..instr.op_count() {
            assert_ne!(
                instr.op_kind(i),
                OpKind::Memory,
                "unexpected memory access: {:02x?}",
                out.text,
            );
        }
    }
    let m = mnemonics(&out.text);
    assert_eq!(m.iter().filter(|&&m| m == Mnemonic::Add).count(), 2); // one ALU add, one rsp unwind
    assert_eq!(*m.last().unwrap(), Mnemonic::Ret);
}

#[test]
fn set_local_severs_live_references() {
    // (param i32) (result i32):
    //   get_local 0; get_local 0; i32.const 5; set_local 0; i32.add
    // The references pushed before the assignment must observe the old
    // value, so the set must copy them out before updating the cache.
    let sig = Sig::new(vec![Type::I32], Some(Type::I32));
    let body = [
        0x00, 0x20, 0x00, 0x20, 0x00, 0x41, 0x05, 0x21, 0x00, 0x6a, 0x0b,
    ];
    let out = compile(module(), &sig, &body);
    let m = mnemonics(&out.text);
    // Both references materialize through register moves ahead of the
    // assignment.
    assert!(m.iter().filter(|&&m| m == Mnemonic::Mov).count() >= 2, "{m:?}");
    disassemble(&out.text);
}

#[test]
fn direct_call_with_args_in_place_emits_no_shuffles() {
    // Caller (param i32 i32) (result i32) calls a same-signature function
    // with its own parameters in order; they already sit in the ABI
    // argument registers.
    let sigs = [Sig::new(vec![Type::I32, Type::I32], Some(Type::I32))];
    let module = Module {
        func_sigs: &[0],
        sigs: &sigs,
        func_addrs: &[0],
        table_funcs: &[],
        globals: &[],
    };
    // get_local 0; get_local 1; call 0
    let body = [0x00, 0x20, 0x00, 0x20, 0x01, 0x10, 0x00, 0x0b];
    let out = compile(module, &sigs[0], &body);

    let instrs = disassemble(&out.text);
    let m: Vec<_> = instrs.iter().map(|i| i.mnemonic()).collect();
    // No argument shuffling: no exchanges, no register-to-register moves
    // other than the result placement (eax <- eax is elided entirely).
    assert_eq!(m.iter().filter(|&&m| m == Mnemonic::Xchg).count(), 0);
    let reg_moves = instrs
        .iter()
        .filter(|i| {
            i.mnemonic() == Mnemonic::Mov
                && i.op_kind(0) == OpKind::Register
                && i.op_kind(1) == OpKind::Register
        })
        .count();
    assert_eq!(reg_moves, 0, "{m:?}");
    // The stack-exhaustion trap call and the actual call.
    assert_eq!(m.iter().filter(|&&m| m == Mnemonic::Call).count(), 2);
    // No stack-parameter backoff: the final add adjusts only the locals
    // frame.
    assert_eq!(out.call_sites.len(), 1);
    assert_eq!(out.call_sites[0].func_index, 0);
}

#[test]
fn indirect_call_swaps_index_out_of_the_result_register() {
    // The first argument arrives in the result register (it is a call
    // result); the table index must swap with it on its way to the result
    // register.
    let sigs = [
        Sig::new(vec![], Some(Type::I32)),
        Sig::new(vec![Type::I32], Some(Type::I32)),
    ];
    let module = Module {
        func_sigs: &[0],
        sigs: &sigs,
        func_addrs: &[0],
        table_funcs: &[7, 8, 9],
        globals: &[],
    };
    // (param i32) (result i32): call 0; get_local 0; call_indirect 1
    let body = [
        0x00, 0x10, 0x00, 0x20, 0x00, 0x11, 0x01, 0x00, 0x0b,
    ];
    let out = compile(module, &sigs[1], &body);

    let instrs = disassemble(&out.text);
    let m: Vec<_> = instrs.iter().map(|i| i.mnemonic()).collect();
    assert!(m.contains(&Mnemonic::Xchg), "{m:?}");
    // The thunk calls through a register.
    assert!(
        instrs
            .iter()
            .any(|i| i.mnemonic() == Mnemonic::Call && i.op_kind(0) == OpKind::Register),
        "{m:?}",
    );
    // Bounds check against the baked-in table length.
    assert!(
        instrs
            .iter()
            .any(|i| i.mnemonic() == Mnemonic::Cmp
                && i.op_kind(1) == OpKind::Immediate8
                && i.immediate8() == 3),
        "{m:?}",
    );
}

#[test]
fn control_flow_compiles_and_decodes() {
    // (param i32) (result i32): a loop that decrements the parameter and
    // accumulates into a local, with an if/else in the body.
    let sig = Sig::new(vec![Type::I32], Some(Type::I32));
    let body = [
        0x01, 0x01, 0x7f, // one extra i32 local
        0x02, 0x40, // block
        0x03, 0x40, // loop
        0x20, 0x00, // get_local 0
        0x45, // i32.eqz
        0x0d, 0x01, // br_if 1 (exit block)
        0x20, 0x00, // get_local 0
        0x41, 0x01, // i32.const 1
        0x6b, // i32.sub
        0x21, 0x00, // set_local 0
        0x20, 0x01, // get_local 1
        0x41, 0x02, // i32.const 2
        0x6a, // i32.add
        0x21, 0x01, // set_local 1
        0x0c, 0x00, // br 0 (continue loop)
        0x0b, // end loop
        0x0b, // end block
        0x20, 0x01, // get_local 1
        0x0b, // end
    ];
    let out = compile(module(), &sig, &body);
    let m = mnemonics(&out.text);
    assert_eq!(*m.last().unwrap(), Mnemonic::Ret);
    // The backward branch and the forward break both exist.
    assert!(m.contains(&Mnemonic::Jmp), "{m:?}");
    assert!(m.iter().any(|&m| m == Mnemonic::Je || m == Mnemonic::Jne), "{m:?}");
}

#[test]
fn division_emits_traps_and_uses_the_fixed_registers() {
    // (param i32 i32) (result i32): i32.div_s
    let sig = Sig::new(vec![Type::I32, Type::I32], Some(Type::I32));
    let body = [0x00, 0x20, 0x00, 0x20, 0x01, 0x6d, 0x0b];
    let out = compile(module(), &sig, &body);
    let m = mnemonics(&out.text);
    assert!(m.contains(&Mnemonic::Idiv), "{m:?}");
    assert!(m.contains(&Mnemonic::Cdq), "{m:?}");
    // Divide-by-zero and overflow trap sites were recorded.
    use sunbeam_codegen::links::TrapId;
    assert!(!out.trap_sites[TrapId::IntegerDivideByZero as usize].is_empty());
    assert!(!out.trap_sites[TrapId::IntegerOverflow as usize].is_empty());
}

#[test]
fn float_compare_and_select() {
    // (param f64 f64) (result f64): select the larger via f64.gt.
    let sig = Sig::new(vec![Type::F64, Type::F64], Some(Type::F64));
    let body = [
        0x00, 0x20, 0x00, 0x20, 0x01, 0x20, 0x00, 0x20, 0x01, 0x64, 0x1b, 0x0b,
    ];
    let out = compile(module(), &sig, &body);
    let m = mnemonics(&out.text);
    assert!(m.contains(&Mnemonic::Ucomisd), "{m:?}");
    assert_eq!(*m.last().unwrap(), Mnemonic::Ret);
}

#[test]
fn memory_access_addresses_the_memory_base() {
    use iced_x86::Register;
    // (param i32) (result i32): i32.load offset=4
    let sig = Sig::new(vec![Type::I32], Some(Type::I32));
    let body = [0x00, 0x20, 0x00, 0x28, 0x02, 0x04, 0x0b];
    let out = compile(module(), &sig, &body);
    assert!(
        disassemble(&out.text)
            .iter()
            .any(|i| i.mnemonic() == Mnemonic::Mov
                && i.op_kind(1) == OpKind::Memory
                && i.memory_base() == Register::R14
                && i.memory_displacement64() == 4),
        "{:02x?}",
        out.text,
    );
}

#[test]
fn trunc_emits_conversion_traps() {
    // (param f32) (result i32): i32.trunc_s/f32
    let sig = Sig::new(vec![Type::F32], Some(Type::I32));
    let body = [0x00, 0x20, 0x00, 0xa8, 0x0b];
    let out = compile(module(), &sig, &body);
    let m = mnemonics(&out.text);
    assert!(m.contains(&Mnemonic::Cvttss2si), "{m:?}");
    use sunbeam_codegen::links::TrapId;
    assert!(!out.trap_sites[TrapId::InvalidConversionToInteger as usize].is_empty());
}

#[test]
fn dead_code_after_return_is_skipped() {
    // (result i32): i32.const 1; return; i32.const 2; drop
    let sig = Sig::new(vec![], Some(Type::I32));
    let body = [0x00, 0x41, 0x01, 0x0f, 0x41, 0x02, 0x1a, 0x0b];
    let out = compile(module(), &sig, &body);
    // Only one constant reaches the result register.
    let loads: Vec<_> = disassemble(&out.text)
        .iter()
        .filter(|i| i.mnemonic() == Mnemonic::Mov && i.op_kind(1) == OpKind::Immediate32)
        .map(|i| i.immediate32())
        .collect();
    assert_eq!(loads, [1]);
}

#[test]
fn invalid_opcode_is_reported() {
    let sig = Sig::new(vec![], None);
    let body = [0x00, 0xfe, 0x0b];
    let err = compile_function(module(), &sig, &body, TEXT_LIMIT).unwrap_err();
    assert!(err.to_string().contains("invalid opcode"), "{err}");
}

#[test]
fn out_of_bounds_function_index_is_reported() {
    let sig = Sig::new(vec![], None);
    let body = [0x00, 0x10, 0x05, 0x0b];
    let err = compile_function(module(), &sig, &body, TEXT_LIMIT).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("call") && msg.contains("5"), "{msg}");
}

#[test]
fn unresolved_calls_become_self_loop_stubs() {
    let sigs = [Sig::new(vec![], None)];
    let module = Module {
        func_sigs: &[0],
        sigs: &sigs,
        func_addrs: &[0],
        table_funcs: &[],
        globals: &[],
    };
    // call 0
    let body = [0x00, 0x10, 0x00, 0x0b];
    let out = compile(module, &sigs[0], &body);
    let site = out.call_sites[0].ret_addr as usize;
    // The displacement field points the call at itself.
    let disp = i32::from_le_bytes(out.text[site - 4..site].try_into().unwrap());
    assert_eq!(disp, -5);
}

#[test]
fn max_stack_offset_accounts_for_the_return_address() {
    let sigs = [Sig::new(vec![], None)];
    let module = Module {
        func_sigs: &[0],
        sigs: &sigs,
        func_addrs: &[0],
        table_funcs: &[],
        globals: &[],
    };
    let body = [0x00, 0x10, 0x00, 0x0b];
    let out = compile(module, &sigs[0], &body);
    assert!(out.max_stack_offset >= 8);
    assert_eq!(out.call_addrs.len(), 1); // the trap stub is not mapped; the call is
}
