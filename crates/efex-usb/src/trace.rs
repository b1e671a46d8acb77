//! Diagnostic hex+ASCII dump of bulk buffers, gated by the `trace-io`
//! feature so it costs nothing when off and nothing above `Trace` level
//! when on. Presentation grounded on the CLI's `hexdump` command and the
//! original C `hex_dump_region` (16 bytes per line, offset, hex, ASCII).
#![cfg(feature = "trace-io")]

pub fn dump(label: &str, buf: &[u8]) {
    if log::max_level() < log::LevelFilter::Trace {
        return;
    }

    log::trace!("{label}: {} bytes", buf.len());
    for (i, chunk) in buf.chunks(16).enumerate() {
        let mut hex = String::with_capacity(16 * 3);
        let mut ascii = String::with_capacity(16);
        for byte in chunk {
            hex.push_str(&format!("{byte:02x} "));
            ascii.push(if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            });
        }
        log::trace!("  {:08x}  {:<48} {}", i * 16, hex, ascii);
    }
}
