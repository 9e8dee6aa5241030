pub mod entry;

pub use entry::{
    is_member_attribute, AddEntry, Attribute, EntryRecord, MemberRef, MembershipEdge, TreeNode,
    MEMBER_ATTRIBUTES,
};
