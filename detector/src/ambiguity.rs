// ambiguity.rs — Proxy identities for indistinguishable tags
//
// When two live tags cannot be told apart within tolerance, the graph keeps
// a single pattern owned by a synthetic proxy tag. The proxy stands for
// "one of these tags, we cannot tell which". Membership grows as more
// matching tags arrive and shrinks as they leave; a proxy with one member
// left dissolves back into that member.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::tag::{Tag, TagId};

/// Outcome of removing one member from its proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leave {
    /// The tag was not a member of any proxy.
    NotMember,
    /// The proxy keeps its identity with at least two members remaining.
    Remaining { proxy: TagId },
    /// The proxy shrank to a single member and was dissolved.
    Dissolved { proxy: TagId, survivor: TagId },
}

/// Per-graph proxy-tag bookkeeping. Proxy ids count down from -1 so they
/// can never collide with real motus ids.
#[derive(Debug, Default)]
pub struct Ambiguity {
    proxies: HashMap<BTreeSet<TagId>, TagId>,
    members: HashMap<TagId, BTreeSet<TagId>>,
    member_of: HashMap<TagId, TagId>,
    proxy_tags: HashMap<TagId, Arc<Tag>>,
    next_proxy: i32,
}

impl Ambiguity {
    pub fn new() -> Self {
        Ambiguity {
            next_proxy: -1,
            ..Default::default()
        }
    }

    /// The proxy currently standing in for `tag`, if any.
    pub fn proxy_for(&self, tag: TagId) -> Option<TagId> {
        self.member_of.get(&tag).copied()
    }

    pub fn proxy_tag(&self, proxy: TagId) -> Option<&Arc<Tag>> {
        self.proxy_tags.get(&proxy)
    }

    pub fn members_of(&self, proxy: TagId) -> Option<&BTreeSet<TagId>> {
        self.members.get(&proxy)
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Fold `new_tag` into the group occupying `occupant`'s pattern.
    ///
    /// `occupant` is either a real tag (a fresh two-member proxy is minted)
    /// or an existing proxy (its member set grows under a fresh proxy id and
    /// the smaller proxy dissolves). `occupant_tag` supplies the pattern the
    /// proxy inherits. Returns the proxy tag now owning the pattern.
    pub fn join(&mut self, occupant: TagId, occupant_tag: &Tag, new_tag: TagId) -> Arc<Tag> {
        let mut group = if occupant.is_proxy() {
            let old = self
                .members
                .remove(&occupant)
                .unwrap_or_else(|| panic!("proxy {occupant} has no member set"));
            self.proxies.remove(&old);
            self.proxy_tags.remove(&occupant);
            old
        } else {
            let mut s = BTreeSet::new();
            s.insert(occupant);
            s
        };
        group.insert(new_tag);

        let proxy_id = TagId(self.next_proxy);
        self.next_proxy -= 1;
        let proxy = Arc::new(Tag::relabeled(proxy_id, occupant_tag));

        for &m in &group {
            self.member_of.insert(m, proxy_id);
        }
        self.members.insert(proxy_id, group.clone());
        self.proxies.insert(group, proxy_id);
        self.proxy_tags.insert(proxy_id, proxy.clone());
        proxy
    }

    /// Remove `tag` from its proxy. A shrink that leaves two or more
    /// members keeps the proxy id in place; a shrink to one dissolves it.
    pub fn leave(&mut self, tag: TagId) -> Leave {
        let Some(proxy) = self.member_of.remove(&tag) else {
            return Leave::NotMember;
        };
        let old = self
            .members
            .remove(&proxy)
            .unwrap_or_else(|| panic!("proxy {proxy} has no member set"));
        self.proxies.remove(&old);

        let mut group = old;
        group.remove(&tag);
        if group.len() >= 2 {
            self.members.insert(proxy, group.clone());
            self.proxies.insert(group, proxy);
            Leave::Remaining { proxy }
        } else {
            let survivor = *group
                .iter()
                .next()
                .unwrap_or_else(|| panic!("proxy {proxy} shrank below one member"));
            self.member_of.remove(&survivor);
            self.proxy_tags.remove(&proxy);
            Leave::Dissolved { proxy, survivor }
        }
    }
}
