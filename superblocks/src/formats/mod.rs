//! One probe per on-disk format.

mod amiga;
mod aodos;
mod befs;
mod btrfs;
mod ext;
mod f2fs;
mod hammer;
mod hfsplus;
mod hpfs;
mod jfs;
mod minix;
mod nilfs2;
mod ntfs;
mod ods;
mod opera;
mod reiserfs;
mod squashfs;
mod ufs;
mod xfs;

pub use amiga::Amiga;
pub use aodos::AoDos;
pub use befs::BeFs;
pub use btrfs::Btrfs;
pub use ext::{Ext, ExtType};
pub use f2fs::F2fs;
pub use hammer::Hammer;
pub use hfsplus::HfsPlus;
pub use hpfs::Hpfs;
pub use jfs::Jfs;
pub use minix::Minix;
pub use nilfs2::Nilfs2;
pub use ntfs::Ntfs;
pub use ods::Ods;
pub use opera::Opera;
pub use reiserfs::ReiserFs;
pub use squashfs::{Compression, SquashFs};
pub use ufs::Ufs;
pub use xfs::Xfs;

use crate::{
	normalize::{Report, VolumeInfo},
	types::{Filesystem, Information},
};

/// Every known format, in the order they are probed.
pub static ALL: &[&dyn Filesystem] = &[
	&AoDos,
	&Xfs,
	&Btrfs,
	&Ext,
	&Hammer,
	&BeFs,
	&Ufs,
	&Jfs,
	&F2fs,
	&Nilfs2,
	&SquashFs,
	&Minix,
	&Hpfs,
	&Ntfs,
	&Amiga,
	&Ods,
	&HfsPlus,
	&ReiserFs,
	&Opera,
];

fn finish(report: Report, metadata: VolumeInfo) -> Information {
	Information {
		text: report.finish_with(&metadata),
		metadata,
	}
}

/// Adds a warning when a count that is part of `total` is bigger than it.
fn check_count(report: &mut Report, what: &str, total: u64, part: u64) {
	if part > total {
		report.corrupt(format_args!("{} {} out of {}", part, what, total));
	}
}

/// Valid images for every format, paired with the probe's name.
#[cfg(test)]
pub(crate) fn samples() -> Vec<(&'static str, crate::source::MemoryImage)> {
	vec![
		("aodos", aodos::sample()),
		("xfs", xfs::sample()),
		("btrfs", btrfs::sample()),
		("ext", ext::sample()),
		("hammer", hammer::sample()),
		("befs", befs::sample()),
		("ufs", ufs::sample()),
		("jfs", jfs::sample()),
		("f2fs", f2fs::sample()),
		("nilfs2", nilfs2::sample()),
		("squashfs", squashfs::sample()),
		("minix", minix::sample()),
		("hpfs", hpfs::sample()),
		("ntfs", ntfs::sample()),
		("amiga", amiga::sample()),
		("ods", ods::sample()),
		("hfsplus", hfsplus::sample()),
		("reiserfs", reiserfs::sample()),
		("opera", opera::sample()),
	]
}
