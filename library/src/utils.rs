use rtc_tutorials_protocol::MediaProfile;

/// Route panics to the browser console.
pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, panics are
    // forwarded to the browser console with a readable message.
    //
    // For more details see
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Swap the extension of a recording path for the one matching `profile`.
///
/// A path without an extension gets one appended.
#[must_use]
pub fn recording_file_name(current: &str, profile: MediaProfile) -> String {
    let stem = match current.rsplit_once('.') {
        Some((stem, extension)) if !extension.contains('/') => stem,
        _ => current,
    };
    format!("{stem}.{}", profile.extension())
}

/// Complete a file name typed by the user with the extension of `profile`.
///
/// Names already ending in the extension are kept as typed; empty names are rejected.
#[must_use]
pub fn normalize_file_name(name: &str, profile: MediaProfile) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if name.ends_with(profile.extension()) {
        Some(name.to_owned())
    } else {
        Some(format!("{name}.{}", profile.extension()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn changing_profile_swaps_extension() {
        assert_eq!(
            recording_file_name("file:///tmp/recording.webm", MediaProfile::Mp4),
            "file:///tmp/recording.mp4"
        );
        assert_eq!(
            recording_file_name("file:///tmp/recording", MediaProfile::Webm),
            "file:///tmp/recording.webm"
        );
    }

    #[test]
    fn dots_in_directories_are_not_extensions() {
        assert_eq!(
            recording_file_name("file:///tmp/v1.2/recording", MediaProfile::Mp4),
            "file:///tmp/v1.2/recording.mp4"
        );
    }

    #[test]
    fn typed_names_get_missing_extension() {
        assert_eq!(
            normalize_file_name("demo", MediaProfile::Webm).as_deref(),
            Some("demo.webm")
        );
        assert_eq!(
            normalize_file_name("demo.mp4", MediaProfile::Mp4).as_deref(),
            Some("demo.mp4")
        );
        assert_eq!(normalize_file_name("", MediaProfile::Mp4), None);
    }
}
