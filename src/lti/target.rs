//! Maps a validated launch to the in-app landing path.
//!
//! Precedence, first match wins:
//!
//! | # | Source | Path |
//! |---|--------|------|
//! | 1 | `custom.edusphere_content_id` | `/learn/{id}` |
//! | 2 | `custom.edusphere_course_id` | `/courses/{id}` |
//! | 3 | `context.id` | `/courses/{id}` |
//! | 4 | `resource_link.id` (non-empty) | `/courses/{id}` |
//! | 5 | `target_link_uri`, root-relative only | as-is |
//! | 6 | - | `/dashboard` |
//!
//! Rule 5 never follows an absolute or protocol-relative URI.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use super::claims::LaunchClaims;

/// Custom parameter naming a content item.
pub const CUSTOM_CONTENT_ID: &str = "edusphere_content_id";

/// Custom parameter naming a course.
pub const CUSTOM_COURSE_ID: &str = "edusphere_course_id";

/// Fallback landing path.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Characters escaped when an id is used as one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Resolve the landing path for a launch.
#[must_use]
pub fn resolve_target(claims: &LaunchClaims) -> String {
    if let Some(id) = claims.custom_str(CUSTOM_CONTENT_ID) {
        return format!("/learn/{}", segment(&id));
    }
    if let Some(id) = claims.custom_str(CUSTOM_COURSE_ID) {
        return format!("/courses/{}", segment(&id));
    }
    if let Some(ctx) = claims.context().filter(|c| !c.id.is_empty()) {
        return format!("/courses/{}", segment(&ctx.id));
    }
    let link = &claims.resource_link().id;
    if !link.is_empty() {
        return format!("/courses/{}", segment(link));
    }
    if is_root_relative(claims.target_link_uri()) {
        return claims.target_link_uri().to_string();
    }
    DASHBOARD_PATH.to_string()
}

fn segment(id: &str) -> String {
    utf8_percent_encode(id, SEGMENT).to_string()
}

/// `/path` is allowed; `//host`, `/\host`, and anything absolute are not.
fn is_root_relative(uri: &str) -> bool {
    let mut chars = uri.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !uri.chars().any(char::is_control)
}
