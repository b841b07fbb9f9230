//! Opcode dispatch and block translation
//!
//! The primary opcode selects either an emitter directly or one of the
//! extended-opcode maps. Maps are built once on first use.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::warn;
use xe_core::config::JitConfig;
use xe_core::error::JitError;
use xe_core::jit_debug;
use xe_memory::GuestMemory;

use super::builder::{BlockBuilder, EmitContext};
use super::ir::Block;
use super::{alu, branch, fpu, load_store, system, vxu};
use crate::instruction::Instruction;

/// Emitter for one guest instruction
pub type Emitter = fn(&mut EmitContext<'_>, Instruction);

type OpMap = HashMap<u32, Emitter>;

struct DispatchTable {
    primary: [Option<Emitter>; 64],
    /// Opcode 19, by `xo10`
    cr_branch: OpMap,
    /// Opcode 30, by `xo_md`, then `xo_mds`
    rotate_md: OpMap,
    rotate_mds: OpMap,
    /// Opcode 31, by `xo10`, then `xo9` for the OE forms
    x_form: OpMap,
    xo_form: OpMap,
    /// Opcodes 58 and 62, by `xo_ds`
    load_ds: OpMap,
    store_ds: OpMap,
    /// Opcode 59, by `xo5`
    single: OpMap,
    /// Opcode 63, by `xo5`, then `xo10`
    double_a: OpMap,
    double_x: OpMap,
    /// Opcode 4, by `vxo6`, then `vxo11`, then `vxo10`
    vector_va: OpMap,
    vector_vx: OpMap,
    vector_cmp: OpMap,
}

fn map(entries: &[(u32, Emitter)]) -> OpMap {
    entries.iter().copied().collect()
}

static TABLE: Lazy<DispatchTable> = Lazy::new(DispatchTable::build);

impl DispatchTable {
    fn build() -> Self {
        let mut primary: [Option<Emitter>; 64] = [None; 64];
        let direct: &[(usize, Emitter)] = &[
            (2, alu::tdi),
            (3, alu::twi),
            (7, alu::mulli),
            (8, alu::subfic),
            (10, alu::cmpli),
            (11, alu::cmpi),
            (12, alu::addic),
            (13, alu::addic_rc),
            (14, alu::addi),
            (15, alu::addis),
            (16, branch::bc),
            (17, system::sc),
            (18, branch::b),
            (20, alu::rlwimi),
            (21, alu::rlwinm),
            (23, alu::rlwnm),
            (24, alu::ori),
            (25, alu::oris),
            (26, alu::xori),
            (27, alu::xoris),
            (28, alu::andi_rc),
            (29, alu::andis_rc),
            (32, load_store::lwz),
            (33, load_store::lwzu),
            (34, load_store::lbz),
            (35, load_store::lbzu),
            (36, load_store::stw),
            (37, load_store::stwu),
            (38, load_store::stb),
            (39, load_store::stbu),
            (40, load_store::lhz),
            (41, load_store::lhzu),
            (42, load_store::lha),
            (43, load_store::lhau),
            (44, load_store::sth),
            (45, load_store::sthu),
            (48, load_store::lfs),
            (49, load_store::lfsu),
            (50, load_store::lfd),
            (51, load_store::lfdu),
            (52, load_store::stfs),
            (53, load_store::stfsu),
            (54, load_store::stfd),
            (55, load_store::stfdu),
        ];
        for (opcd, emitter) in direct {
            primary[*opcd] = Some(*emitter);
        }

        Self {
            primary,
            cr_branch: map(&[
                (0, branch::mcrf),
                (16, branch::bclr),
                (528, branch::bcctr),
                (33, branch::crnor),
                (129, branch::crandc),
                (193, branch::crxor),
                (225, branch::crnand),
                (257, branch::crand),
                (289, branch::creqv),
                (417, branch::crorc),
                (449, branch::cror),
                (150, system::barrier),
            ]),
            rotate_md: map(&[
                (0, alu::rldicl),
                (1, alu::rldicr),
                (2, alu::rldic),
                (3, alu::rldimi),
            ]),
            rotate_mds: map(&[(8, alu::rldcl), (9, alu::rldcr)]),
            x_form: map(&[
                (0, alu::cmp),
                (32, alu::cmpl),
                (4, alu::tw),
                (68, alu::td),
                (26, alu::cntlzw),
                (58, alu::cntlzd),
                (28, alu::and),
                (60, alu::andc),
                (124, alu::nor),
                (284, alu::eqv),
                (316, alu::xor),
                (412, alu::orc),
                (444, alu::or),
                (476, alu::nand),
                (922, alu::extsh),
                (954, alu::extsb),
                (986, alu::extsw),
                (24, alu::slw),
                (27, alu::sld),
                (536, alu::srw),
                (539, alu::srd),
                (792, alu::sraw),
                (794, alu::srad),
                (824, alu::srawi),
                // sradi carries sh[5] in the low bit of xo10
                (826, alu::sradi),
                (827, alu::sradi),
                (19, system::mfcr),
                (83, system::mfmsr),
                (144, system::mtcrf),
                (178, system::mtmsrd),
                (339, system::mfspr),
                (371, system::mftb),
                (467, system::mtspr),
                (54, system::barrier),
                (86, system::barrier),
                (246, system::barrier),
                (278, system::barrier),
                (598, system::barrier),
                (854, system::barrier),
                (982, system::barrier),
                (23, load_store::lwzx),
                (55, load_store::lwzux),
                (87, load_store::lbzx),
                (119, load_store::lbzux),
                (279, load_store::lhzx),
                (311, load_store::lhzux),
                (343, load_store::lhax),
                (375, load_store::lhaux),
                (341, load_store::lwax),
                (373, load_store::lwaux),
                (21, load_store::ldx),
                (53, load_store::ldux),
                (532, load_store::ldbrx),
                (534, load_store::lwbrx),
                (790, load_store::lhbrx),
                (151, load_store::stwx),
                (183, load_store::stwux),
                (215, load_store::stbx),
                (247, load_store::stbux),
                (407, load_store::sthx),
                (439, load_store::sthux),
                (149, load_store::stdx),
                (181, load_store::stdux),
                (660, load_store::stdbrx),
                (662, load_store::stwbrx),
                (918, load_store::sthbrx),
                (535, load_store::lfsx),
                (599, load_store::lfdx),
                (663, load_store::stfsx),
                (727, load_store::stfdx),
                (983, load_store::stfiwx),
                (20, load_store::lwarx),
                (84, load_store::ldarx),
                (150, load_store::stwcx),
                (214, load_store::stdcx),
                (6, load_store::lvsl),
                (38, load_store::lvsr),
                (103, load_store::lvx),
                (231, load_store::stvx),
                (135, load_store::stvebx),
                (167, load_store::stvehx),
                (199, load_store::stvewx),
                (519, load_store::lvlx),
                (551, load_store::lvrx),
                (647, load_store::stvlx),
                (679, load_store::stvrx),
            ]),
            xo_form: map(&[
                (8, alu::subfc),
                (9, alu::mulhdu),
                (10, alu::addc),
                (11, alu::mulhwu),
                (40, alu::subf),
                (73, alu::mulhd),
                (75, alu::mulhw),
                (104, alu::neg),
                (136, alu::subfe),
                (138, alu::adde),
                (200, alu::subfze),
                (202, alu::addze),
                (232, alu::subfme),
                (233, alu::mulld),
                (234, alu::addme),
                (235, alu::mullw),
                (266, alu::add),
                (457, alu::divdu),
                (459, alu::divwu),
                (489, alu::divd),
                (491, alu::divw),
            ]),
            load_ds: map(&[(0, load_store::ld), (1, load_store::ldu), (2, load_store::lwa)]),
            store_ds: map(&[(0, load_store::std), (1, load_store::stdu)]),
            single: map(&[
                (18, fpu::fdivs),
                (20, fpu::fsubs),
                (21, fpu::fadds),
                (22, fpu::fsqrts),
                (24, fpu::fres),
                (25, fpu::fmuls),
                (28, fpu::fmsubs),
                (29, fpu::fmadds),
                (30, fpu::fnmsubs),
                (31, fpu::fnmadds),
            ]),
            double_a: map(&[
                (18, fpu::fdiv),
                (20, fpu::fsub),
                (21, fpu::fadd),
                (22, fpu::fsqrt),
                (23, fpu::fsel),
                (25, fpu::fmul),
                (26, fpu::frsqrte),
                (28, fpu::fmsub),
                (29, fpu::fmadd),
                (30, fpu::fnmsub),
                (31, fpu::fnmadd),
            ]),
            double_x: map(&[
                (0, fpu::fcmpu),
                (12, fpu::frsp),
                (14, fpu::fctiw),
                (15, fpu::fctiwz),
                (32, fpu::fcmpo),
                (38, fpu::mtfsb1),
                (40, fpu::fneg),
                (70, fpu::mtfsb0),
                (72, fpu::fmr),
                (136, fpu::fnabs),
                (264, fpu::fabs),
                (583, fpu::mffs),
                (711, fpu::mtfsf),
                (814, fpu::fctid),
                (815, fpu::fctidz),
                (846, fpu::fcfid),
            ]),
            vector_va: map(&[
                (42, vxu::vsel),
                (43, vxu::vperm),
                (44, vxu::vsldoi),
                (46, vxu::vmaddfp),
                (47, vxu::vnmsubfp),
            ]),
            vector_vx: map(&[
                (0, vxu::vaddubm),
                (64, vxu::vadduhm),
                (128, vxu::vadduwm),
                (384, vxu::vaddcuw),
                (1024, vxu::vsububm),
                (1088, vxu::vsubuhm),
                (1152, vxu::vsubuwm),
                (1600, vxu::vsubuhs),
                (10, vxu::vaddfp),
                (74, vxu::vsubfp),
                (1034, vxu::vmaxfp),
                (1098, vxu::vminfp),
                (522, vxu::vrfin),
                (586, vxu::vrfiz),
                (650, vxu::vrfip),
                (714, vxu::vrfim),
                (266, vxu::vrefp),
                (330, vxu::vrsqrtefp),
                (394, vxu::vexptefp),
                (458, vxu::vlogefp),
                (1028, vxu::vand),
                (1092, vxu::vandc),
                (1156, vxu::vor),
                (1220, vxu::vxor),
                (1284, vxu::vnor),
                (12, vxu::vmrghb),
                (76, vxu::vmrghh),
                (140, vxu::vmrghw),
                (268, vxu::vmrglb),
                (332, vxu::vmrglh),
                (396, vxu::vmrglw),
                (524, vxu::vspltb),
                (588, vxu::vsplth),
                (652, vxu::vspltw),
                (780, vxu::vspltisb),
                (844, vxu::vspltish),
                (908, vxu::vspltisw),
                (260, vxu::vslb),
                (324, vxu::vslh),
                (388, vxu::vslw),
                (516, vxu::vsrb),
                (580, vxu::vsrh),
                (644, vxu::vsrw),
                (772, vxu::vsrab),
                (836, vxu::vsrah),
                (900, vxu::vsraw),
                (78, vxu::vpkuwum),
                (462, vxu::vpkswss),
                (1540, vxu::mfvscr),
                (1604, vxu::mtvscr),
            ]),
            vector_cmp: map(&[
                (134, vxu::vcmpequw),
                (198, vxu::vcmpeqfp),
                (454, vxu::vcmpgefp),
                (710, vxu::vcmpgtfp),
            ]),
        }
    }

    fn lookup(&self, instr: Instruction) -> Option<Emitter> {
        let get = |map: &OpMap, xo: u32| map.get(&xo).copied();
        match instr.opcd() {
            4 => get(&self.vector_va, instr.vxo6())
                .or_else(|| get(&self.vector_vx, instr.vxo11()))
                .or_else(|| get(&self.vector_cmp, instr.vxo10())),
            19 => get(&self.cr_branch, instr.xo10()),
            30 => get(&self.rotate_md, instr.xo_md()).or_else(|| get(&self.rotate_mds, instr.xo_mds())),
            31 => get(&self.x_form, instr.xo10()).or_else(|| get(&self.xo_form, instr.xo9())),
            58 => get(&self.load_ds, instr.xo_ds()),
            59 => get(&self.single, instr.xo5()),
            62 => get(&self.store_ds, instr.xo_ds()),
            63 => get(&self.double_a, instr.xo5()).or_else(|| get(&self.double_x, instr.xo10())),
            opcd => self.primary[opcd as usize],
        }
    }
}

/// Emitter for `instr`, if one exists
pub fn lookup(instr: Instruction) -> Option<Emitter> {
    TABLE.lookup(instr)
}

/// Instructions after which translation stops
pub fn ends_block(instr: Instruction) -> bool {
    match instr.opcd() {
        16 | 17 | 18 => true,
        // bclr, bcctr, isync
        19 => matches!(instr.xo10(), 16 | 528 | 150),
        // mtmsrd can change the address mode
        31 => instr.xo10() == 178,
        _ => false,
    }
}

/// Translate the block starting at `start`
///
/// Translation stops after a branch, after `max_block_instructions`, at a
/// fetch fault, or at the first instruction without an emitter. A block whose
/// first instruction cannot be translated is an error.
pub fn translate_block(memory: &GuestMemory, start: u64, config: &JitConfig) -> Result<Block, JitError> {
    let mut builder = BlockBuilder::new(start);
    let mut addr = start;

    while builder.instructions() < config.max_block_instructions.max(1) {
        let word = match memory.fetch(addr) {
            Ok(word) => word,
            Err(source) if builder.instructions() == 0 => return Err(JitError::Fetch { addr, source }),
            Err(_) => break,
        };
        let instr = Instruction::new(word);
        let Some(emitter) = lookup(instr) else {
            warn!("No emitter for 0x{:08X} ({:?}) at 0x{:08X}", word, instr, addr);
            if builder.instructions() == 0 {
                return Err(JitError::Unimplemented { addr, opcode: word });
            }
            break;
        };

        builder.emit_instruction(addr, instr, config.exit_on_exception, emitter);
        addr = addr.wrapping_add(4);
        if ends_block(instr) {
            break;
        }
    }

    let block = builder.finish()?;
    jit_debug!(
        "translated block 0x{:08X}: {} instructions, {} ops",
        block.start,
        block.instructions,
        block.ops.len()
    );
    if config.dump_ir {
        jit_debug!("{}", block);
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decodes(word: u32) -> bool {
        lookup(Instruction(word)).is_some()
    }

    #[test]
    fn test_primary_opcodes() {
        // addi r3, r0, 1
        assert!(decodes(0x3860_0001));
        // b +8
        assert!(decodes(0x4800_0008));
        // opcode 1 is reserved
        assert!(!decodes(0x0400_0000));
    }

    #[test]
    fn test_oe_forms_decode() {
        // add r3, r4, r5 and addo r3, r4, r5
        assert!(decodes(0x7C64_2A14));
        assert!(decodes(0x7C64_2E14));
        // divw. r3, r4, r5
        assert!(decodes(0x7C64_2BD7));
    }

    #[test]
    fn test_extended_spaces() {
        // fmadd f1, f2, f3, f4
        assert!(decodes(0xFC22_213A));
        // fcmpu cr0, f1, f2
        assert!(decodes(0xFC01_1000));
        // vaddfp v1, v2, v3
        assert!(decodes(0x1022_180A));
        // vcmpeqfp. v1, v2, v3
        assert!(decodes(0x1022_1CC6));
        // vperm v1, v2, v3, v4
        assert!(decodes(0x1022_192B));
        // rldicl r3, r4, 0, 32
        assert!(decodes(0x7883_0020));
        // lwarx r3, 0, r4
        assert!(decodes(0x7C60_2028));
    }

    #[test]
    fn test_block_boundaries() {
        assert!(ends_block(Instruction(0x4E80_0020))); // blr
        assert!(ends_block(Instruction(0x4800_0008)));
        assert!(!ends_block(Instruction(0x3860_0001)));
    }
}
