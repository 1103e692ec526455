use std::path::{Component, Path, PathBuf};

/// Extraction root with its canonical form resolved once per run.
#[derive(Clone, Debug)]
pub struct Destination {
    root:      PathBuf,
    canonical: PathBuf,
}

impl Destination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let canonical = canonicalize_lenient(&root);
        Self { root, canonical }
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Map an archive entry name to a path inside the destination.
    ///
    /// Never fails. Names that would land outside the destination, directly
    /// or through a symlink already present in it, are rewritten: first by
    /// dropping the `..` segments that climb above the root, then by keeping
    /// only the final segment, and as a last resort by returning the root.
    pub fn resolve(&self, entry_name: &str) -> PathBuf {
        let candidate = self.join(segments(entry_name));
        let canonical = canonicalize_lenient(&candidate);
        if canonical == self.canonical {
            return self.root.clone();
        }
        // Interior `..` must not reach the filesystem: rebuild from the
        // canonical remainder.
        if self.is_inside(&canonical) {
            let relative = canonical.strip_prefix(&self.canonical).unwrap_or(Path::new(""));
            return self.root.join(relative);
        }

        let cleaned = clean(entry_name);
        let rebuilt = self.join(cleaned.iter().copied().map(Segment::Name));
        if rebuilt == self.root || self.is_inside(&canonicalize_lenient(&rebuilt)) {
            tracing::warn!(entry = entry_name, resolved = %rebuilt.display(), "entry escapes destination, rebuilt inside it");
            return rebuilt;
        }

        if let Some(last) = cleaned.last() {
            let flattened = self.root.join(last);
            if self.is_inside(&canonicalize_lenient(&flattened)) {
                tracing::warn!(entry = entry_name, resolved = %flattened.display(), "entry escapes destination through a link, flattened");
                return flattened;
            }
        }

        tracing::warn!(entry = entry_name, "entry cannot be placed inside destination, using the root");
        self.root.clone()
    }

    fn join<'a>(&self, segments: impl Iterator<Item = Segment<'a>>) -> PathBuf {
        let mut path = self.root.clone();
        for segment in segments {
            match segment {
                Segment::Parent => path.push(".."),
                Segment::Name(name) => path.push(name),
            }
        }
        path
    }

    fn is_inside(&self, canonical: &Path) -> bool {
        canonical != self.canonical && canonical.starts_with(&self.canonical)
    }
}

/// One-off form of [`Destination::resolve`].
pub fn resolve(destination: &Path, entry_name: &str) -> PathBuf {
    Destination::new(destination).resolve(entry_name)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Segment<'a> {
    Parent,
    Name(&'a str),
}

/// Split an entry name on `/`, skipping empty and `.` segments and anything
/// the host would read as a root or drive prefix.
fn segments(name: &str) -> impl Iterator<Item = Segment<'_>> {
    name.split('/').filter_map(|segment| match segment {
        "" | "." => None,
        ".." => Some(Segment::Parent),
        _ => {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => Some(Segment::Name(segment)),
                _ => None,
            }
        }
    })
}

/// Lexically normalize an entry name, dropping `..` segments that would climb
/// above the root.
fn clean(name: &str) -> Vec<&str> {
    let mut stack = Vec::new();
    for segment in segments(name) {
        match segment {
            Segment::Parent => {
                stack.pop();
            }
            Segment::Name(name) => stack.push(name),
        }
    }
    stack
}

/// Canonicalize the longest existing prefix of `path` and resolve the rest
/// lexically.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let components: Vec<Component<'_>> = path.components().collect();
    for split in (1..=components.len()).rev() {
        let head: PathBuf = components[..split].iter().collect();
        if let Ok(mut resolved) = std::fs::canonicalize(&head) {
            for component in &components[split..] {
                match component {
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    Component::Normal(part) => resolved.push(part),
                    Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                }
            }
            return resolved;
        }
    }
    normalize_path(path)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(component.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }

    result
}
