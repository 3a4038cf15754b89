//! Query classification.
//!
//! Every new query term is classified once, when it is set on a
//! [`QuerySession`](crate::QuerySession). Runners consult the resulting
//! [`QueryKind`] through [`Runner::ignored_kinds`](crate::Runner::ignored_kinds)
//! so that, for example, a calculator never sees `/usr/lib`.
//!
//! Classification order matters and is fixed:
//!
//! 1. the first word resolves to an executable on `PATH` (or is one by path),
//! 2. the term parses as a URL with a remote scheme and a host,
//! 3. the term names an existing path, after case correction,
//! 4. otherwise the term is [`QueryKind::UNKNOWN`].

use std::fs;
use std::path::{Component, Path, PathBuf};

use bitflags::bitflags;

bitflags! {
	/// Kind of a query term. The empty set means "no query".
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct QueryKind: u32 {
		/// Nothing recognizable.
		const UNKNOWN = 1;
		/// Existing directory.
		const DIRECTORY = 1 << 1;
		/// Existing regular file.
		const FILE = 1 << 2;
		/// Remote URL.
		const NETWORK_LOCATION = 1 << 3;
		/// Bare executable name or path.
		const EXECUTABLE = 1 << 4;
		/// Executable followed by arguments.
		const SHELL_COMMAND = 1 << 5;
		/// Help request.
		const HELP = 1 << 6;
		/// Anything that touches the local filesystem.
		const FILESYSTEM = Self::DIRECTORY.bits() | Self::FILE.bits() | Self::EXECUTABLE.bits() | Self::SHELL_COMMAND.bits();
	}
}

impl Default for QueryKind {
	fn default() -> Self {
		Self::UNKNOWN
	}
}

/// Schemes that address the local machine and never count as network locations.
const LOCAL_SCHEMES: &[&str] = &["file"];

/// MIME type reported for directories.
pub const DIRECTORY_MIME: &str = "inode/directory";

const FALLBACK_MIME: &str = "application/octet-stream";

const MIME_BY_EXTENSION: &[(&str, &str)] = &[
	("txt", "text/plain"),
	("md", "text/markdown"),
	("rs", "text/rust"),
	("toml", "application/toml"),
	("json", "application/json"),
	("html", "text/html"),
	("htm", "text/html"),
	("css", "text/css"),
	("js", "application/javascript"),
	("sh", "application/x-shellscript"),
	("py", "text/x-python"),
	("c", "text/x-csrc"),
	("h", "text/x-chdr"),
	("cpp", "text/x-c++src"),
	("xml", "application/xml"),
	("pdf", "application/pdf"),
	("png", "image/png"),
	("jpg", "image/jpeg"),
	("jpeg", "image/jpeg"),
	("gif", "image/gif"),
	("svg", "image/svg+xml"),
	("mp3", "audio/mpeg"),
	("ogg", "audio/ogg"),
	("mp4", "video/mp4"),
	("zip", "application/zip"),
	("gz", "application/gzip"),
	("tar", "application/x-tar"),
	("desktop", "application/x-desktop"),
];

/// Result of classifying a query term.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
	/// Detected kind.
	pub kind: QueryKind,
	/// MIME type for filesystem paths and network locations.
	pub mime_type: Option<String>,
}

impl Classification {
	fn kind(kind: QueryKind) -> Self {
		Self { kind, mime_type: None }
	}
}

/// Classifies `term`.
///
/// An empty term classifies as [`QueryKind::empty`].
pub fn classify(term: &str) -> Classification {
	let term = term.trim();
	if term.is_empty() {
		return Classification::kind(QueryKind::empty());
	}

	let path = clean_path(&expand_tilde(term));

	let program = path.split_once(' ').map_or(path.as_str(), |(head, _)| head);
	if !program.is_empty() && which::which(program).is_ok() {
		let kind = if path.find(' ').is_some_and(|space| space > 0) {
			QueryKind::SHELL_COMMAND
		} else {
			QueryKind::EXECUTABLE
		};
		return Classification::kind(kind);
	}

	if let Ok(url) = url::Url::parse(term)
		&& !LOCAL_SCHEMES.contains(&url.scheme())
		&& url.host_str().is_some_and(|host| !host.is_empty())
	{
		return Classification {
			kind: QueryKind::NETWORK_LOCATION,
			mime_type: Some(format!("x-scheme-handler/{}", url.scheme())),
		};
	}

	if let Some(corrected) = correct_path_case(&path) {
		let target = fs::canonicalize(&corrected).unwrap_or(corrected);
		if let Ok(meta) = fs::metadata(&target) {
			if meta.is_dir() {
				return Classification {
					kind: QueryKind::DIRECTORY,
					mime_type: Some(DIRECTORY_MIME.to_string()),
				};
			}
			if meta.is_file() {
				return Classification {
					kind: QueryKind::FILE,
					mime_type: Some(mime_for_path(&target).to_string()),
				};
			}
		}
	}

	Classification::kind(QueryKind::UNKNOWN)
}

/// Best-effort MIME type for a file path, by extension.
pub fn mime_for_path(path: &Path) -> &'static str {
	let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
		return FALLBACK_MIME;
	};
	let ext = ext.to_ascii_lowercase();
	MIME_BY_EXTENSION.iter().find(|(known, _)| *known == ext).map_or(FALLBACK_MIME, |(_, mime)| mime)
}

/// Resolves `path` to an existing path by correcting the case of each
/// component in turn, descending from the first.
///
/// Returns `None` when some component has no case-insensitive match. Every
/// component but the last must resolve to a directory; the last must too when
/// `path` ends in `/`.
pub fn correct_path_case(path: &str) -> Option<PathBuf> {
	if Path::new(path).exists() {
		return Some(PathBuf::from(path));
	}

	let mut components: Vec<&str> = path.split('/').collect();
	if components.len() < 2 {
		return None;
	}

	let trailing_slash = components.last().is_some_and(|last| last.is_empty());
	if trailing_slash {
		components.pop();
	}

	let last = components.len() - 1;
	let mut head = components[0].to_string();
	for (idx, next) in components.iter().enumerate().skip(1) {
		let must_be_dir = idx < last || trailing_slash;
		let candidate = format!("{head}/{next}");
		head = correct_last_component(&candidate, must_be_dir)?;
	}

	Some(PathBuf::from(head))
}

fn correct_last_component(path: &str, must_be_dir: bool) -> Option<String> {
	let as_path = Path::new(path);
	if as_path.exists() && (!must_be_dir || as_path.is_dir()) {
		return Some(path.to_string());
	}

	let name = as_path.file_name()?.to_str()?.to_lowercase();
	let dir = match as_path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
		_ => PathBuf::from("."),
	};

	let entries = fs::read_dir(&dir).ok()?;
	for entry in entries.flatten() {
		let file_name = entry.file_name();
		let Some(candidate) = file_name.to_str() else {
			continue;
		};
		if candidate.to_lowercase() != name {
			continue;
		}
		let full = dir.join(candidate);
		if must_be_dir && !full.is_dir() {
			continue;
		}
		let parent = path.rsplit_once('/').map_or("", |(parent, _)| parent);
		return Some(format!("{parent}/{candidate}"));
	}

	None
}

fn expand_tilde(term: &str) -> String {
	let rest = if term == "~" {
		""
	} else if let Some(rest) = term.strip_prefix("~/") {
		rest
	} else {
		return term.to_string();
	};

	match dirs::home_dir() {
		Some(home) if rest.is_empty() => home.to_string_lossy().into_owned(),
		Some(home) => home.join(rest).to_string_lossy().into_owned(),
		None => term.to_string(),
	}
}

/// Lexically normalizes `.`/`..` segments and duplicate separators.
///
/// Text after the first space is left untouched so shell arguments survive.
fn clean_path(path: &str) -> String {
	let (head, tail) = match path.split_once(' ') {
		Some((head, tail)) => (head, Some(tail)),
		None => (path, None),
	};
	if !head.contains('/') {
		return path.to_string();
	}

	let mut out = PathBuf::new();
	for component in Path::new(head).components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				if !out.pop() {
					out.push("..");
				}
			}
			other => out.push(other.as_os_str()),
		}
	}

	let mut cleaned = out.to_string_lossy().into_owned();
	if cleaned.is_empty() {
		cleaned.push('.');
	}
	if head.ends_with('/') && !cleaned.ends_with('/') {
		cleaned.push('/');
	}
	match tail {
		Some(tail) => format!("{cleaned} {tail}"),
		None => cleaned,
	}
}
