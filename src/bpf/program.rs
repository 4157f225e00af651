//! Synthesises the `BPF_PROG_TYPE_CGROUP_DEVICE` filter program: a fixed,
//! hand-assembled instruction sequence that looks a device access up in a
//! pinned hash map, falling back to an "any minor" entry on a first miss.
//! See `SPEC_FULL.md` §4.5.4 for the five-step algorithm this encodes.
//!
//! The teacher crate's `v2/devices/program.rs` builds a rule-list program —
//! a chain of immediate comparisons against literal major/minor values
//! compiled in at attach time. This program instead looks values up in a
//! map so the allow-list can change without reloading the program, which
//! means it needs its own instruction encoder rather than the teacher's
//! rule-chain one. The raw opcode encoding below is the stable eBPF ISA, not
//! anything specific to `libbpf-sys`'s generated bindings.

use std::os::unix::io::RawFd;

// Instruction classes (low 3 bits of the opcode byte).
const BPF_LD: u8 = 0x00;
const BPF_LDX: u8 = 0x01;
const BPF_STX: u8 = 0x03;
const BPF_ALU64: u8 = 0x07;
const BPF_JMP: u8 = 0x05;

// Size modifiers for load/store class instructions.
const BPF_W: u8 = 0x00;
const BPF_DW: u8 = 0x18;

// Addressing modes.
const BPF_IMM: u8 = 0x00;
const BPF_MEM: u8 = 0x60;

// ALU/JMP operation codes (already positioned in the high nibble).
const BPF_AND: u8 = 0x50;
const BPF_ADD: u8 = 0x00;
const BPF_MOV: u8 = 0xb0;
const BPF_JEQ: u8 = 0x10;
const BPF_JGT: u8 = 0x20;
const BPF_JNE: u8 = 0x50;
const BPF_CALL: u8 = 0x80;
const BPF_EXIT: u8 = 0x90;

const BPF_K: u8 = 0x00;
const BPF_X: u8 = 0x08;

const BPF_PSEUDO_MAP_FD: u8 = 1;
const BPF_FUNC_MAP_LOOKUP_ELEM: i32 = 1;

const R0: u8 = 0;
const R1: u8 = 1;
const R2: u8 = 2;
const R3: u8 = 3;
const R6: u8 = 6;
const R7: u8 = 7;
const R8: u8 = 8;
const R10: u8 = 10;

/// `BPF_DEVCG_DEV_CHAR`/`BPF_DEVCG_DEV_BLOCK` as defined by the kernel's
/// cgroup device uapi; the low 16 bits of `bpf_cgroup_dev_ctx.access_type`.
const DEVCG_DEV_BLOCK: i32 = 1;
const DEVCG_DEV_CHAR: i32 = 2;

fn insn(code: u8, dst: u8, src: u8, off: i16, imm: i32) -> [u8; 8] {
    let mut b = [0u8; 8];
    b[0] = code;
    b[1] = (dst & 0x0f) | (src << 4);
    b[2..4].copy_from_slice(&off.to_le_bytes());
    b[4..8].copy_from_slice(&imm.to_le_bytes());
    b
}

fn mov64_imm(dst: u8, imm: i32) -> [u8; 8] {
    insn(BPF_ALU64 | BPF_MOV | BPF_K, dst, 0, 0, imm)
}

fn mov64_reg(dst: u8, src: u8) -> [u8; 8] {
    insn(BPF_ALU64 | BPF_MOV | BPF_X, dst, src, 0, 0)
}

fn and64_imm(dst: u8, imm: i32) -> [u8; 8] {
    insn(BPF_ALU64 | BPF_AND | BPF_K, dst, 0, 0, imm)
}

fn add64_imm(dst: u8, imm: i32) -> [u8; 8] {
    insn(BPF_ALU64 | BPF_ADD | BPF_K, dst, 0, 0, imm)
}

fn ldx_w(dst: u8, src: u8, off: i16) -> [u8; 8] {
    insn(BPF_LDX | BPF_W | BPF_MEM, dst, src, off, 0)
}

fn stx_w(dst: u8, src: u8, off: i16) -> [u8; 8] {
    insn(BPF_STX | BPF_W | BPF_MEM, dst, src, off, 0)
}

fn jeq_imm(dst: u8, imm: i32, off: i16) -> [u8; 8] {
    insn(BPF_JMP | BPF_JEQ | BPF_K, dst, 0, off, imm)
}

fn jne_imm(dst: u8, imm: i32, off: i16) -> [u8; 8] {
    insn(BPF_JMP | BPF_JNE | BPF_K, dst, 0, off, imm)
}

/// Unsigned `dst > imm`.
fn jgt_imm(dst: u8, imm: i32, off: i16) -> [u8; 8] {
    insn(BPF_JMP | BPF_JGT | BPF_K, dst, 0, off, imm)
}

fn call(func_id: i32) -> [u8; 8] {
    insn(BPF_JMP | BPF_CALL | BPF_K, 0, 0, 0, func_id)
}

fn exit() -> [u8; 8] {
    insn(BPF_JMP | BPF_EXIT | BPF_K, 0, 0, 0, 0)
}

/// `BPF_LD_MAP_FD`: a double-length immediate load that the verifier
/// resolves to the map's kernel object at load time. Two instruction slots,
/// one logical instruction.
fn ld_map_fd(dst: u8, map_fd: RawFd) -> [[u8; 8]; 2] {
    [
        insn(BPF_LD | BPF_DW | BPF_IMM, dst, BPF_PSEUDO_MAP_FD, 0, map_fd),
        insn(0, 0, 0, 0, 0),
    ]
}

/// Number of 8-byte instruction slots this program occupies, counting a
/// `ld_map_fd` pair as one logical instruction for budget purposes.
pub const LOGICAL_INSTRUCTION_COUNT: usize = 30;

/// Builds the bytecode for the map-lookup filter program described above.
/// `map_fd` must stay open for the program's lifetime; the verifier takes
/// its own reference when the program loads.
pub fn synthesize(map_fd: RawFd) -> Vec<u8> {
    let key_off: i16 = -16;
    let mut out: Vec<u8> = Vec::with_capacity(32 * 8);
    let mut push = |i: [u8; 8]| out.extend_from_slice(&i);

    push(mov64_reg(R7, R1)); // save ctx
    push(ldx_w(R6, R7, 0)); // r6 = access_type
    push(and64_imm(R6, 0xffff)); // r6 = type bits only

    // DEVCG_DEV_BLOCK(1)/DEVCG_DEV_CHAR(2) are adjacent, so kind-1 is 0 or 1
    // for a valid access type and wraps to a large unsigned value (or lands
    // above 1) for anything else, which the single jgt below denies.
    push(add64_imm(R6, -1));
    push(jgt_imm(R6, 1, 25)); // neither block nor char -> deny
    push(add64_imm(R6, 'b' as i32)); // r6 = (kind-1) + 'b' -> 'b' or 'c'
    push(mov64_reg(R8, R6));
    push(stx_w(R10, R8, key_off)); // key[0..4) = tag (+ zero pad)
    push(ldx_w(R2, R7, 4)); // r2 = major
    push(stx_w(R10, R2, key_off + 4)); // key[4..8) = major
    push(ldx_w(R3, R7, 8)); // r3 = minor
    push(stx_w(R10, R3, key_off + 8)); // key[8..12) = minor

    for i in ld_map_fd(R1, map_fd) {
        push(i);
    }
    push(mov64_reg(R2, R10));
    push(add64_imm(R2, key_off as i32));
    push(call(BPF_FUNC_MAP_LOOKUP_ELEM));
    push(jeq_imm(R0, 0, 2)); // miss -> fall back to any-minor lookup
    push(ldx_w(R0, R0, 0)); // hit: r0 = *value
    push(exit());

    push(mov64_imm(R2, -1)); // ANY_MINOR as u32, stored via a 4-byte write
    push(stx_w(R10, R2, key_off + 8)); // key[8..12) = ANY_MINOR

    for i in ld_map_fd(R1, map_fd) {
        push(i);
    }
    push(mov64_reg(R2, R10));
    push(add64_imm(R2, key_off as i32));
    push(call(BPF_FUNC_MAP_LOOKUP_ELEM));
    push(jeq_imm(R0, 0, 2)); // second miss -> deny
    push(ldx_w(R0, R0, 0));
    push(exit());

    push(mov64_imm(R0, 0)); // deny by default; also the unknown-kind target above
    push(exit());

    out
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn synthesize_is_a_whole_number_of_instructions() {
        let bytes = synthesize(3);
        assert_eq!(bytes.len() % 8, 0);
    }

    #[test]
    fn synthesize_stays_within_instruction_budget() {
        let bytes = synthesize(3);
        let physical = bytes.len() / 8;
        // Two ld_map_fd pairs each count as one logical instruction.
        assert_eq!(physical - 2, LOGICAL_INSTRUCTION_COUNT);
        assert!(LOGICAL_INSTRUCTION_COUNT <= 30);
    }

    #[repr(C)]
    struct CgroupDevCtx {
        access_type: u32,
        major: u32,
        minor: u32,
    }

    thread_local! {
        static FAKE_MAP: RefCell<HashMap<[u8; 12], u32>> = RefCell::new(HashMap::new());
    }

    fn map_lookup_elem(_map_fd: u64, key_ptr: u64, _: u64, _: u64, _: u64) -> u64 {
        let key = unsafe { std::slice::from_raw_parts(key_ptr as *const u8, 12) };
        let mut arr = [0u8; 12];
        arr.copy_from_slice(key);
        FAKE_MAP.with(|m| match m.borrow().get(&arr) {
            Some(v) => v as *const u32 as u64,
            None => 0,
        })
    }

    fn run(access_type: u32, major: u32, minor: u32, map: HashMap<[u8; 12], u32>) -> u64 {
        FAKE_MAP.with(|m| *m.borrow_mut() = map);
        let prog = synthesize(0);
        let mut vm = rbpf::EbpfVmRaw::new(Some(&prog)).expect("program assembles");
        vm.register_helper(BPF_FUNC_MAP_LOOKUP_ELEM as u32, map_lookup_elem)
            .expect("helper registers");

        let ctx = CgroupDevCtx {
            access_type,
            major,
            minor,
        };
        let mut mem = unsafe {
            std::slice::from_raw_parts_mut(
                &ctx as *const CgroupDevCtx as *mut u8,
                std::mem::size_of::<CgroupDevCtx>(),
            )
        };
        vm.execute_program(&mut mem).expect("program runs")
    }

    fn key(tag: u8, major: u32, minor: u32) -> [u8; 12] {
        let mut k = [0u8; 12];
        k[0] = tag;
        k[4..8].copy_from_slice(&major.to_ne_bytes());
        k[8..12].copy_from_slice(&minor.to_ne_bytes());
        k
    }

    #[test]
    fn exact_match_is_allowed() {
        let mut map = HashMap::new();
        map.insert(key(b'c', 5, 1), 1u32);
        let result = run(DEVCG_DEV_CHAR as u32, 5, 1, map);
        assert_eq!(result, 1);
    }

    #[test]
    fn exact_match_deny_entry_is_denied() {
        let mut map = HashMap::new();
        map.insert(key(b'c', 5, 1), 0u32);
        let result = run(DEVCG_DEV_CHAR as u32, 5, 1, map);
        assert_eq!(result, 0);
    }

    #[test]
    fn falls_back_to_any_minor_entry() {
        let mut map = HashMap::new();
        map.insert(key(b'c', 5, u32::MAX), 1u32);
        let result = run(DEVCG_DEV_CHAR as u32, 5, 99, map);
        assert_eq!(result, 1);
    }

    #[test]
    fn unmatched_access_denies_by_default() {
        let map = HashMap::new();
        let result = run(DEVCG_DEV_CHAR as u32, 5, 99, map);
        assert_eq!(result, 0);
    }

    #[test]
    fn block_devices_use_the_block_tag() {
        let mut map = HashMap::new();
        map.insert(key(b'b', 7, 0), 1u32);
        let result = run(1 /* BPF_DEVCG_DEV_BLOCK */, 7, 0, map);
        assert_eq!(result, 1);
    }

    #[test]
    fn unknown_access_type_is_denied_even_if_the_map_would_otherwise_match() {
        let mut map = HashMap::new();
        map.insert(key(b'b', 5, 1), 1u32);
        map.insert(key(b'c', 5, 1), 1u32);
        let result = run(0 /* neither BLOCK nor CHAR */, 5, 1, map);
        assert_eq!(result, 0);
    }
}
