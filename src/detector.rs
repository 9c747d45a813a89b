// Path Version Detection
//
// Finds the first `/v<digits>` segment of a request path and produces the
// version-agnostic form used for endpoint deduplication.
//
// Example:
//   Input:  "/api/v1/users?id=3"
//   Output: Detection {
//             normalized_path: "/api/{v}/users?id=3",
//             segment: VersionSegment { token: "v1", start: 4, end: 7 }
//           }
//
// The segment must be followed by `/` or by the end of the path component
// (the path component ends at the first `?` or `#`).

use lazy_static::lazy_static;
use regex::Regex;

/// Replaces the version segment in normalized paths
pub const VERSION_PLACEHOLDER: &str = "/{v}";

lazy_static! {
    static ref VERSION_SEGMENT: Regex = Regex::new(r"/v[0-9]+(?:/|$)").unwrap();
}

/// The literal version segment found in a path, with its byte span (leading slash included)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSegment {
    /// Segment without slashes, e.g. "v2"
    pub token: String,
    pub start: usize,
    pub end: usize,
}

impl VersionSegment {
    /// The matched text, e.g. "/v2"
    pub fn literal(&self) -> String {
        format!("/{}", self.token)
    }

    /// Replace exactly this segment's span in `path`
    pub fn replace_in(&self, path: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(path.len() - (self.end - self.start) + replacement.len());
        out.push_str(&path[..self.start]);
        out.push_str(replacement);
        out.push_str(&path[self.end..]);
        out
    }
}

/// Result of a successful detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub normalized_path: String,
    pub segment: VersionSegment,
}

/// Detect the first version segment in `path`.
///
/// Returns `None` when the path carries no version, which is a normal
/// "nothing to do" answer rather than an error.
pub fn detect(path: &str) -> Option<Detection> {
    let component_end = path.find(|c| c == '?' || c == '#').unwrap_or(path.len());
    let component = &path[..component_end];

    let m = VERSION_SEGMENT.find(component)?;
    let end = if m.as_str().ends_with('/') { m.end() - 1 } else { m.end() };
    let segment = VersionSegment {
        token: component[m.start() + 1..end].to_string(),
        start: m.start(),
        end,
    };

    Some(Detection {
        normalized_path: segment.replace_in(path, VERSION_PLACEHOLDER),
        segment,
    })
}
