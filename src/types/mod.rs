mod metadata;
mod fragment;

pub use fragment::{FragmentKey, KeyStamper, Stamp, FRAGMENT_PREFIX};
pub(crate) use fragment::checksum;
pub use metadata::{FragmentSet, FragmentSetId, NewFragmentSet};
