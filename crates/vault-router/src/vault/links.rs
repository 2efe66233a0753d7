use serde::{Deserialize, Serialize};

/// `obsidian://open` links for a note. Some clients resolve `file=` only
/// without the `.md` extension, others only with it, so both are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsidianUrls {
    pub without_md: String,
    pub with_md: String,
}

pub fn obsidian_open_urls(vault: &str, open_path: &str, heading: Option<&str>) -> ObsidianUrls {
    let normalized = open_path.replace('\\', "/");
    let has_ext = normalized.to_ascii_lowercase().ends_with(".md");

    let without_md = if has_ext {
        normalized[..normalized.len() - 3].to_string()
    } else {
        normalized.clone()
    };
    let with_md = if has_ext {
        normalized
    } else {
        format!("{}.md", normalized)
    };

    let vault = urlencoding::encode(vault);
    let build = |file: &str| {
        let file = file
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!("obsidian://open?vault={}&file={}", vault, file);
        if let Some(heading) = heading.filter(|h| !h.trim().is_empty()) {
            url.push_str("%23");
            url.push_str(&urlencoding::encode(heading));
        }
        url
    };

    ObsidianUrls {
        without_md: build(&without_md),
        with_md: build(&with_md),
    }
}
