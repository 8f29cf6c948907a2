//! Accumulates emitted assembly text, line by line, and the small set of
//! instruction-encoding helpers every lowering routine shares: 12-bit
//! immediate range checks and large-constant materialization.

use std::fmt;

/// The largest value that fits in a signed 12-bit immediate field, and
/// its negation — every direct `$fp`-relative offset and every immediate
/// arithmetic operand is checked against this range before being emitted
/// literally; anything wider is synthesized into a scratch register.
pub fn fits_imm12(val: i64) -> bool {
    (-2048..=2047).contains(&val)
}

/// Output buffer for one module's worth of assembly text.
#[derive(Debug, Default)]
pub struct AsmEmitter {
    lines: Vec<String>,
    label_counter: u32,
}

impl AsmEmitter {
    pub fn new() -> Self {
        AsmEmitter::default()
    }

    pub fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn emit_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.lines.push(fmt::format(args));
    }

    pub fn directive(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("    # {}", text.as_ref()));
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        self.lines.push(format!("{}:", name.as_ref()));
    }

    /// A fresh, function-unique label for constructs (stack probes, etc.)
    /// that don't come from the source IR's own block names.
    pub fn fresh_label(&mut self, prefix: &str) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!(".L{prefix}{n}")
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Materialize a 32-bit constant into `reg`, high bits first — `lu12i.w`
/// loads the sign-extended high 20 bits, `ori` or-merges in the low 12.
pub fn load_large_int32(asm: &mut AsmEmitter, val: i32, reg: &str) {
    let high20 = val >> 12;
    let low12 = (val as u32) & 0xFFF;
    asm.emit_fmt(format_args!("    lu12i.w {reg}, {high20}"));
    asm.emit_fmt(format_args!("    ori {reg}, {reg}, {low12}"));
}

/// Materialize a 64-bit constant (used for stack offsets past the 12-bit
/// range) into `reg`: the low 32 bits via `load_large_int32`, then
/// `lu32i.d`/`lu52i.d` to fill in the high bits.
pub fn load_large_int64(asm: &mut AsmEmitter, val: i64, reg: &str) {
    let low32 = val as i32;
    load_large_int32(asm, low32, reg);
    let high32 = (val >> 32) as i32;
    let high32_low20 = (high32 << 12) >> 12;
    let high32_high12 = high32 >> 20;
    asm.emit_fmt(format_args!("    lu32i.d {reg}, {high32_low20}"));
    asm.emit_fmt(format_args!("    lu52i.d {reg}, {high32_high12}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imm12_boundaries() {
        assert!(fits_imm12(2047));
        assert!(fits_imm12(-2048));
        assert!(!fits_imm12(2048));
        assert!(!fits_imm12(-2049));
    }

    #[test]
    fn large_int32_splits_high_and_low_bits() {
        let mut asm = AsmEmitter::new();
        load_large_int32(&mut asm, 0x12345, "$t0");
        let out = asm.finish();
        assert!(out.contains("lu12i.w $t0, 18"));
        assert!(out.contains("ori $t0, $t0, 837"));
    }
}

/// Property tests, exercised over random offsets: `fits_imm12`'s range
/// matches its own stated definition, and the `lu12i.w`/`ori` pair this
/// module falls back to for any immediate outside that range always
/// reconstructs the original 32-bit value bit-for-bit.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn last_number(line: &str) -> i64 {
        line.rsplit(' ').next().unwrap().parse().expect("emitted operand is a decimal integer")
    }

    proptest! {
        #[test]
        fn fits_imm12_matches_its_own_range_definition(val in any::<i64>()) {
            prop_assert_eq!(fits_imm12(val), (-2048..=2047).contains(&val));
        }

        #[test]
        fn large_int32_round_trips_for_any_i32(val in any::<i32>()) {
            let mut asm = AsmEmitter::new();
            load_large_int32(&mut asm, val, "$t0");
            let out = asm.finish();
            let mut lines = out.lines();
            let high20 = last_number(lines.next().expect("lu12i.w line"));
            let low12 = last_number(lines.next().expect("ori line"));
            let reconstructed = ((high20 << 12) | low12) as i32;
            prop_assert_eq!(reconstructed, val);
        }
    }
}
