use serde::{Deserialize, Serialize};

/// Wire shape of a permission set. Always converted through
/// `InvitationPermissionSet::from_flags` so the hierarchy holds on load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PermissionFlags {
    can_create_assessments: bool,
    can_view_own_assessments: bool,
    can_view_department_assessments: bool,
    can_view_all_assessments: bool,
    can_access_fda483_analysis: bool,
}

/// Permissions granted to an invited enterprise user.
///
/// Creating assessments and viewing one's own history are always granted.
/// Viewing all assessments implies viewing department assessments; the two
/// setters below are the only way to change those flags, and each cascades
/// so the implication holds after every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PermissionFlags", into = "PermissionFlags")]
pub struct InvitationPermissionSet {
    view_department: bool,
    view_all: bool,
    fda483_analysis: bool,
}

impl InvitationPermissionSet {
    /// Baseline set: only the fixed permissions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a set from raw flags, normalizing `view_all` into
    /// `view_department`.
    #[must_use]
    pub fn from_flags(view_department: bool, view_all: bool, fda483_analysis: bool) -> Self {
        let mut set = Self {
            view_department,
            view_all: false,
            fda483_analysis,
        };
        set.set_view_all(view_all);
        set
    }

    /// Enables or disables department-wide viewing. Disabling also revokes
    /// enterprise-wide viewing.
    pub fn set_view_department(&mut self, enabled: bool) {
        self.view_department = enabled;
        if !enabled {
            self.view_all = false;
        }
    }

    /// Enables or disables enterprise-wide viewing. Enabling also grants
    /// department-wide viewing.
    pub fn set_view_all(&mut self, enabled: bool) {
        self.view_all = enabled;
        if enabled {
            self.view_department = true;
        }
    }

    pub fn set_fda483_analysis(&mut self, enabled: bool) {
        self.fda483_analysis = enabled;
    }

    #[must_use]
    pub fn can_create_assessments(&self) -> bool {
        true
    }

    #[must_use]
    pub fn can_view_own_assessments(&self) -> bool {
        true
    }

    #[must_use]
    pub fn can_view_department_assessments(&self) -> bool {
        self.view_department
    }

    #[must_use]
    pub fn can_view_all_assessments(&self) -> bool {
        self.view_all
    }

    #[must_use]
    pub fn can_access_fda483_analysis(&self) -> bool {
        self.fda483_analysis
    }
}

impl From<PermissionFlags> for InvitationPermissionSet {
    fn from(flags: PermissionFlags) -> Self {
        Self::from_flags(
            flags.can_view_department_assessments,
            flags.can_view_all_assessments,
            flags.can_access_fda483_analysis,
        )
    }
}

impl From<InvitationPermissionSet> for PermissionFlags {
    fn from(set: InvitationPermissionSet) -> Self {
        Self {
            can_create_assessments: set.can_create_assessments(),
            can_view_own_assessments: set.can_view_own_assessments(),
            can_view_department_assessments: set.view_department,
            can_view_all_assessments: set.view_all,
            can_access_fda483_analysis: set.fda483_analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_state() -> Vec<InvitationPermissionSet> {
        let mut states = Vec::new();
        for department in [false, true] {
            for all in [false, true] {
                for fda in [false, true] {
                    states.push(InvitationPermissionSet::from_flags(department, all, fda));
                }
            }
        }
        states
    }

    fn holds(set: &InvitationPermissionSet) -> bool {
        !set.can_view_all_assessments() || set.can_view_department_assessments()
    }

    #[test]
    fn enabling_view_all_cascades_up() {
        for mut set in every_state() {
            set.set_view_all(true);
            assert!(set.can_view_department_assessments());
            assert!(set.can_view_all_assessments());
        }
    }

    #[test]
    fn disabling_view_department_cascades_down() {
        for mut set in every_state() {
            set.set_view_department(false);
            assert!(!set.can_view_all_assessments());
            assert!(!set.can_view_department_assessments());
        }
    }

    #[test]
    fn invariant_holds_after_any_toggle_sequence() {
        let toggles: [fn(&mut InvitationPermissionSet); 5] = [
            |s| s.set_view_all(true),
            |s| s.set_view_all(false),
            |s| s.set_view_department(true),
            |s| s.set_view_department(false),
            |s| s.set_fda483_analysis(true),
        ];
        for start in every_state() {
            for first in &toggles {
                for second in &toggles {
                    let mut set = start;
                    first(&mut set);
                    assert!(holds(&set));
                    second(&mut set);
                    assert!(holds(&set));
                }
            }
        }
    }

    #[test]
    fn disabling_view_all_keeps_department() {
        let mut set = InvitationPermissionSet::new();
        set.set_view_all(true);
        set.set_view_all(false);
        assert!(set.can_view_department_assessments());
        assert!(!set.can_view_all_assessments());
    }

    #[test]
    fn fixed_permissions_are_always_granted() {
        let set = InvitationPermissionSet::new();
        assert!(set.can_create_assessments());
        assert!(set.can_view_own_assessments());
        assert!(!set.can_access_fda483_analysis());
    }

    #[test]
    fn from_flags_normalizes_inconsistent_input() {
        let set = InvitationPermissionSet::from_flags(false, true, false);
        assert!(set.can_view_department_assessments());
        assert!(set.can_view_all_assessments());
    }
}
