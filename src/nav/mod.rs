//! Navigation derived from feature flags and the caller's session.

use serde::Serialize;

use crate::auth::AuthState;
use crate::config::FeatureFlags;

/// Where the site sends the user after an auth action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Home,
    Profile,
    SignIn,
}

impl Navigation {
    pub fn path(&self) -> &'static str {
        match self {
            Navigation::Home => "/",
            Navigation::Profile => "/profile",
            Navigation::SignIn => "/signin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLink {
    pub href: &'static str,
    pub label: &'static str,
}

const fn link(href: &'static str, label: &'static str) -> NavLink {
    NavLink { href, label }
}

const BASE_LINKS: [NavLink; 4] = [
    link("/", "Home"),
    link("/about", "About"),
    link("/events", "Events"),
    link("/council", "Council"),
];

/// Header links for `state`. Admins see every gated section.
pub fn nav_links(flags: &FeatureFlags, state: &AuthState) -> Vec<NavLink> {
    let admin = state.is_admin();
    let guest_links_allowed = flags.show_sign_in;

    let mut links: Vec<NavLink> = BASE_LINKS.to_vec();

    if (flags.show_join_us && guest_links_allowed) || admin {
        links.push(link("/join-us", "Join Us"));
    }
    if (flags.show_forum && guest_links_allowed) || admin {
        links.push(link("/forum", "Forum"));
    }
    if state.identity().is_some() {
        links.push(link("/profile", "Profile"));
    }
    if admin {
        links.push(link("/admin", "Admin"));
    }

    let mut seen = Vec::with_capacity(links.len());
    links.retain(|l| {
        if seen.contains(&l.href) {
            false
        } else {
            seen.push(l.href);
            true
        }
    });
    links
}

/// The sign-in button shows for anonymous visitors when sign-in is enabled.
pub fn show_sign_in_button(flags: &FeatureFlags, state: &AuthState) -> bool {
    state.identity().is_none() && flags.show_sign_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, Role};

    fn signed_in(role: Role) -> AuthState {
        AuthState::Authenticated {
            identity: Identity {
                uid: "u".into(),
                email: "u@dubai.bits-pilani.ac.in".into(),
                display_name: None,
                photo_url: None,
                hosted_domain: None,
                admin_claim: false,
            },
            role,
        }
    }

    fn hrefs(links: &[NavLink]) -> Vec<&'static str> {
        links.iter().map(|l| l.href).collect()
    }

    #[test]
    fn test_anonymous_defaults() {
        let flags = FeatureFlags::default();
        let links = nav_links(&flags, &AuthState::Anonymous);
        assert_eq!(hrefs(&links), vec!["/", "/about", "/events", "/council"]);
        assert!(show_sign_in_button(&flags, &AuthState::Anonymous));
    }

    #[test]
    fn test_forum_needs_sign_in_flag() {
        let flags = FeatureFlags {
            show_forum: true,
            show_sign_in: false,
            ..FeatureFlags::default()
        };
        let links = nav_links(&flags, &AuthState::Anonymous);
        assert!(!hrefs(&links).contains(&"/forum"));
        assert!(!show_sign_in_button(&flags, &AuthState::Anonymous));
    }

    #[test]
    fn test_admin_sees_everything() {
        let flags = FeatureFlags {
            show_sign_in: false,
            show_join_us: false,
            show_forum: false,
            show_events: false,
            show_mascot: false,
        };
        let links = nav_links(&flags, &signed_in(Role::Admin));
        assert_eq!(
            hrefs(&links),
            vec!["/", "/about", "/events", "/council", "/join-us", "/forum", "/profile", "/admin"]
        );
    }

    #[test]
    fn test_member_gets_profile_not_admin() {
        let flags = FeatureFlags {
            show_forum: true,
            ..FeatureFlags::default()
        };
        let links = hrefs(&nav_links(&flags, &signed_in(Role::Member)));
        assert!(links.contains(&"/forum"));
        assert!(links.contains(&"/profile"));
        assert!(!links.contains(&"/admin"));
        assert!(!show_sign_in_button(&flags, &signed_in(Role::Member)));
    }

    #[test]
    fn test_events_link_ignores_section_flag() {
        let flags = FeatureFlags {
            show_events: false,
            ..FeatureFlags::default()
        };
        let links = hrefs(&nav_links(&flags, &AuthState::Anonymous));
        assert!(links.contains(&"/events"));
    }
}
