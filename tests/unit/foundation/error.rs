use super::*;
use crate::transfer::remote::RemoteErrorKind;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ForgeError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        ForgeError::item_render(7, "x")
            .to_string()
            .contains("render error for item 7:")
    );
    assert!(
        ForgeError::checkpoint_io("x")
            .to_string()
            .contains("checkpoint io error:")
    );
    assert!(ForgeError::setup("x").to_string().contains("setup error:"));
    assert!(
        ForgeError::MetadataMissing(PathBuf::from("1-10/metadata/metadata.json"))
            .to_string()
            .contains("1-10/metadata/metadata.json")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ForgeError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn only_transient_transfer_errors_are_retryable() {
    let transient = ForgeError::from(RemoteError::new(RemoteErrorKind::RateLimited, "slow down"));
    let terminal = ForgeError::from(RemoteError::new(RemoteErrorKind::Client(404), "gone"));
    assert!(transient.is_retryable());
    assert!(!terminal.is_retryable());
    assert!(!ForgeError::validation("x").is_retryable());
}
