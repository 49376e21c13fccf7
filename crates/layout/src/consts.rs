use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Unique snapshot version suffix: `-{yyyyMMdd.HHmmss}-{buildNumber}`.
regex!(SNAPSHOT_TIMESTAMP_REGEX, r"^(.+)-(\d{8}\.\d{6})-(\d+)$");
// Same, anchored at the start of the remainder of a file name.
regex!(SNAPSHOT_TIMESTAMP_PREFIX_REGEX, r"^(\d{8}\.\d{6})-(\d+)");
// Remote-proxied metadata documents are suffixed with the remote's id.
regex!(MAVEN_METADATA_REGEX, r"^maven-metadata(?:-[^.]+)?\.xml$");
// PEP 440 pre-release and development markers.
regex!(PYPI_PRERELEASE_REGEX, r"(?i)(?:^|[\d._-])(?:a|b|c|rc|alpha|beta|pre|preview|dev)\d*(?:$|[.+_-])");
