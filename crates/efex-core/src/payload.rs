//! Payload injection: a host-driven RPC mechanism for SoCs whose mask ROM
//! exposes no register read/write primitive. A short machine-code stub is
//! FEL-written to scratch RAM alongside its argument words, FEL-executed,
//! and (for reads) its result slot is FEL-read back.
//!
//! One concrete `PayloadArch` per target architecture (capability-set
//! pattern), selected per `Session` via `Session::init_payloads` rather than
//! a process-wide function-pointer table, so two sessions never contend over
//! which stub is active.
//!
//! Stub instruction words are fixed machine code for each target: an ARMv7
//! cache/TLB-barrier-then-load/store sequence, and RISC-V equivalents for
//! the generic and E907 cores. Every host this crate targets is
//! little-endian, so the words are stored as plain `u32` and turned into
//! wire bytes once, here, via `to_le_bytes` at the point each word is
//! serialized.

use crate::error::{Error, Result};
use crate::fel;
use crate::session::{DeviceMode, Session};

/// Per-architecture capability: synthesize and run the `readl`/`writel`
/// stub. Implemented once per target architecture; `Session` owns at most
/// one `Box<dyn PayloadArch>` at a time.
pub trait PayloadArch: std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Instruction words for the read stub, in execution order, or `None`
    /// if this architecture has no machine code supplied.
    fn readl_stub(&self) -> Option<&'static [u32]>;

    /// Instruction words for the write stub, or `None`.
    fn writel_stub(&self) -> Option<&'static [u32]>;
}

/// ARMv7: MCR cache/TLB-invalidate barrier sequence, then a PC-relative
/// `ldr`/`str` dereference. 12 words for `readl`, 11 for `writel` — the
/// write stub has no result slot to populate.
#[derive(Debug, Default)]
pub struct Arm32;

/// AArch64: enum tag only. No machine-code stub is defined for this
/// architecture, so both primitives fail with `Error::NotSupport` rather
/// than guessing at an encoding.
#[derive(Debug, Default)]
pub struct Aarch64;

/// Generic RISC-V32: `csrs mxstatus` + `fence.i` barrier, `auipc`/`addi`
/// PC-relative argument-slot addressing, `lw`/`sw`, `ret`.
#[derive(Debug, Default)]
pub struct RiscV32;

/// RISC-V32 variant tuned for the T-Head E907 core. The instruction words
/// it assembles to are the same ones [`RiscV32`] uses; kept as its own type
/// and constants because the source keeps `riscv32_e907/efex-payloads.c` as
/// a separate file from `riscv.c` rather than sharing one.
#[derive(Debug, Default)]
pub struct RiscV32E907;

#[rustfmt::skip]
const ARM32_READL_STUB: [u32; 12] = [
    0b11100011101000000000000000000000, // mov r0, #0
    0b11101110000010000000111100010111, // mcr 15, 0, r0, cr8, cr7, {0}
    0b11101110000001110000111100010101, // mcr 15, 0, r0, cr7, cr5, {0}
    0b11101110000001110000111111010101, // mcr 15, 0, r0, cr7, cr5, {6}
    0b11101110000001110000111110011010, // mcr 15, 0, r0, cr7, cr10, {4}
    0b11101110000001110000111110010101, // mcr 15, 0, r0, cr7, cr5, {4}
    0b11101010111111111111111111111111, // b 0x4
    0b11100101100111110000000000001100, // ldr r0, [pc, #12]
    0b11100010100011110001000000001100, // add r1, pc, #12
    0b11100101100100000010000000000000, // ldr r2, [r0]
    0b11100101100000010010000000000000, // str r2, [r1]
    0b11100001001011111111111100011110, // bx lr
];

#[rustfmt::skip]
const ARM32_WRITEL_STUB: [u32; 11] = [
    0b11100011101000000000000000000000, // mov r0, #0
    0b11101110000010000000111100010111, // mcr 15, 0, r0, cr8, cr7, {0}
    0b11101110000001110000111100010101, // mcr 15, 0, r0, cr7, cr5, {0}
    0b11101110000001110000111111010101, // mcr 15, 0, r0, cr7, cr5, {6}
    0b11101110000001110000111110011010, // mcr 15, 0, r0, cr7, cr10, {4}
    0b11101110000001110000111110010101, // mcr 15, 0, r0, cr7, cr5, {4}
    0b11101010111111111111111111111111, // b 0x4
    0b11100101100111110000000000001000, // ldr r0, [pc, #8]
    0b11100101100111110001000000001000, // ldr r1, [pc, #8]
    0b11100101100000000001000000000000, // str r1, [r0]
    0b11100001001011111111111100011110, // bx lr
];

#[rustfmt::skip]
const RISCV32_READL_STUB: [u32; 12] = [
    0b00000000010000000000001100110111, // lui t1, 0x400
    0b01111100000000110010000001110011, // csrs mxstatus, t1
    0b00000000000000000001000000001111, // fence.i
    0b00000000010000000000000001101111, // j +4
    0b00000000000000000000001010010111, // auipc t0, 0x0
    0b00000010000000101000001010010011, // addi t0, t0, 32
    0b00000000000000101010001010000011, // lw t0, 0(t0)
    0b00000000000000101010001010000011, // lw t0, 0(t0)
    0b00000000000000000000001100010111, // auipc t1, 0x0
    0b00000001010000110000001100010011, // addi t1, t1, 20
    0b00000000010100110010000000100011, // sw t0, 0(t1)
    0b00000000000000001000000001100111, // ret
];

#[rustfmt::skip]
const RISCV32_WRITEL_STUB: [u32; 12] = [
    0b00000000010000000000001100110111, // lui t1, 0x400
    0b01111100000000110010000001110011, // csrs mxstatus, t1
    0b00000000000000000001000000001111, // fence.i
    0b00000000010000000000000001101111, // j +4
    0b00000000000000000000001010010111, // auipc t0, 0x0
    0b00000010000000101000001010010011, // addi t0, t0, 32
    0b00000000000000101010001010000011, // lw t0, 0(t0)
    0b00000000000000000000001100010111, // auipc t1, 0x0
    0b00000001100000110000001100010011, // addi t1, t1, 24
    0b00000000000000110010001100000011, // lw t1, 0(t1)
    0b00000000011000101010000000100011, // sw t1, 0(t0)
    0b00000000000000001000000001100111, // ret
];

// The source stores these words pre-swapped and recovers the true encoding
// via `WARP_INST`/`SWAB32` before the array is written to device memory.
// `to_le_bytes` below is the only swap this port applies, so the constants
// themselves must already hold the true encoding, not the pre-swapped form.
#[rustfmt::skip]
const RISCV32_E907_READL_STUB: [u32; 12] = [
    0b00000000010000000000001100110111, // lui t1, 0x400
    0b01111100000000110010000001110011, // csrs mxstatus, t1
    0b00000000000000000001000000001111, // fence.i
    0b00000000010000000000000001101111, // j +4
    0b00000000000000000000001010010111, // auipc t0, 0x0
    0b00000010000000101000001010010011, // addi t0, t0, 32
    0b00000000000000101010001010000011, // lw t0, 0(t0)
    0b00000000000000101010001010000011, // lw t0, 0(t0)
    0b00000000000000000000001100010111, // auipc t1, 0x0
    0b00000001010000110000001100010011, // addi t1, t1, 20
    0b00000000010100110010000000100011, // sw t0, 0(t1)
    0b00000000000000001000000001100111, // ret
];

#[rustfmt::skip]
const RISCV32_E907_WRITEL_STUB: [u32; 12] = [
    0b00000000010000000000001100110111, // lui t1, 0x400
    0b01111100000000110010000001110011, // csrs mxstatus, t1
    0b00000000000000000001000000001111, // fence.i
    0b00000000010000000000000001101111, // j +4
    0b00000000000000000000001010010111, // auipc t0, 0x0
    0b00000010000000101000001010010011, // addi t0, t0, 32
    0b00000000000000101010001010000011, // lw t0, 0(t0)
    0b00000000000000000000001100010111, // auipc t1, 0x0
    0b00000001100000110000001100010011, // addi t1, t1, 24
    0b00000000000000110010001100000011, // lw t1, 0(t1)
    0b00000000011000101010000000100011, // sw t1, 0(t0)
    0b00000000000000001000000001100111, // ret
];

impl PayloadArch for Arm32 {
    fn name(&self) -> &'static str {
        "arm32"
    }
    fn readl_stub(&self) -> Option<&'static [u32]> {
        Some(&ARM32_READL_STUB)
    }
    fn writel_stub(&self) -> Option<&'static [u32]> {
        Some(&ARM32_WRITEL_STUB)
    }
}

impl PayloadArch for Aarch64 {
    fn name(&self) -> &'static str {
        "aarch64"
    }
    fn readl_stub(&self) -> Option<&'static [u32]> {
        None
    }
    fn writel_stub(&self) -> Option<&'static [u32]> {
        None
    }
}

impl PayloadArch for RiscV32 {
    fn name(&self) -> &'static str {
        "riscv32"
    }
    fn readl_stub(&self) -> Option<&'static [u32]> {
        Some(&RISCV32_READL_STUB)
    }
    fn writel_stub(&self) -> Option<&'static [u32]> {
        Some(&RISCV32_WRITEL_STUB)
    }
}

impl PayloadArch for RiscV32E907 {
    fn name(&self) -> &'static str {
        "riscv32_e907"
    }
    fn readl_stub(&self) -> Option<&'static [u32]> {
        Some(&RISCV32_E907_READL_STUB)
    }
    fn writel_stub(&self) -> Option<&'static [u32]> {
        Some(&RISCV32_E907_WRITEL_STUB)
    }
}

/// Resolve the CLI's `-p <arch>` spelling to a concrete implementation.
/// Recognises `arm`, `aarch64`, `riscv`, and `e907`.
pub fn arch_from_name(name: &str) -> Option<Box<dyn PayloadArch>> {
    match name {
        "arm" => Some(Box::new(Arm32)),
        "aarch64" => Some(Box::new(Aarch64)),
        "riscv" => Some(Box::new(RiscV32)),
        "e907" => Some(Box::new(RiscV32E907)),
        _ => None,
    }
}

fn words_to_le_bytes(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for word in words {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out
}

/// Read a 32-bit value at `addr` via the session's configured payload
/// stub. Fails with `Error::InvalidDeviceMode` if not in FEL mode,
/// `Error::NotSupport` if no payload architecture is configured or the
/// configured one has no read stub (AArch64).
pub fn readl(session: &mut Session, addr: u32) -> Result<u32> {
    session.require_mode(DeviceMode::Fel)?;
    let stub = session
        .payload_arch()
        .and_then(|arch| arch.readl_stub())
        .ok_or(Error::NotSupport)?;

    let base = session.data_start_address();
    let stub_bytes = words_to_le_bytes(stub);
    fel::write(session, base, &stub_bytes)?;

    let arg_addr = base.wrapping_add(stub_bytes.len() as u32);
    fel::write(session, arg_addr, &addr.to_le_bytes())?;

    fel::exec(session, base)?;

    let result_addr = arg_addr.wrapping_add(4);
    let mut result = [0u8; 4];
    fel::read(session, result_addr, &mut result)?;
    Ok(u32::from_le_bytes(result))
}

/// Write `value` to `addr` via the session's configured payload stub. Same
/// gating as [`readl`]; does not read back a result.
pub fn writel(session: &mut Session, value: u32, addr: u32) -> Result<()> {
    session.require_mode(DeviceMode::Fel)?;
    let stub = session
        .payload_arch()
        .and_then(|arch| arch.writel_stub())
        .ok_or(Error::NotSupport)?;

    let base = session.data_start_address();
    let stub_bytes = words_to_le_bytes(stub);
    fel::write(session, base, &stub_bytes)?;

    let arg_addr = base.wrapping_add(stub_bytes.len() as u32);
    let mut args = [0u8; 8];
    args[0..4].copy_from_slice(&addr.to_le_bytes());
    args[4..8].copy_from_slice(&value.to_le_bytes());
    fel::write(session, arg_addr, &args)?;

    fel::exec(session, base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use efex_usb::mock::MockBackend;

    fn ok_outer() -> Vec<u8> {
        let mut raw = [0u8; efex_usb::envelope::OUTER_RESPONSE_LEN];
        raw[0..4].copy_from_slice(b"AWUS");
        raw.to_vec()
    }

    fn ok_inner_status() -> Vec<u8> {
        let mut raw = [0u8; crate::request::INNER_RESPONSE_LEN];
        raw[0..2].copy_from_slice(&crate::request::INNER_RESPONSE_MAGIC.to_le_bytes());
        raw.to_vec()
    }

    fn session_with_arch(arch: Box<dyn PayloadArch>) -> Session {
        let backend = MockBackend::new(0x81, 0x02);
        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        session.set_mode_for_test(DeviceMode::Fel);
        session.init_payloads(arch);
        session
    }

    #[test]
    fn aarch64_has_no_stub_and_fails_not_support() {
        let mut session = session_with_arch(Box::new(Aarch64));
        let err = readl(&mut session, 0x1000).unwrap_err();
        assert!(matches!(err, Error::NotSupport));

        let err = writel(&mut session, 1, 0x1000).unwrap_err();
        assert!(matches!(err, Error::NotSupport));
    }

    #[test]
    fn readl_rejects_wrong_mode_without_any_io() {
        let backend = MockBackend::new(0x81, 0x02);
        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        session.set_mode_for_test(DeviceMode::Srv);
        session.init_payloads(Box::new(Arm32));

        let err = readl(&mut session, 0x1000).unwrap_err();
        assert!(matches!(err, Error::InvalidDeviceMode(DeviceMode::Fel)));
    }

    #[test]
    fn readl_writes_stub_then_addr_then_execs_then_reads_result() {
        let mut backend = MockBackend::new(0x81, 0x02);
        // write stub (1 fel chunk): outer response + inner status
        backend.push_recv(ok_outer());
        backend.push_recv(ok_inner_status());
        // write addr word: outer response + inner status
        backend.push_recv(ok_outer());
        backend.push_recv(ok_inner_status());
        // exec: outer response (send_request) + inner status (read_status)
        backend.push_recv(ok_outer());
        backend.push_recv(ok_inner_status());
        // read result slot: outer response (send_request) + data + outer response (data phase) + inner status
        backend.push_recv(ok_outer());
        backend.push_recv(0x55AA55AAu32.to_le_bytes().to_vec());
        backend.push_recv(ok_outer());
        backend.push_recv(ok_inner_status());
        backend.push_recv(ok_outer());

        let mut session = Session::from_parts(Box::new(backend), 0x81, 0x02);
        session.set_mode_for_test(DeviceMode::Fel);
        session.init_payloads(Box::new(RiscV32));

        let value = readl(&mut session, 0x0300_6200).unwrap();
        assert_eq!(value, 0x55AA55AA);
    }
}
