mod common;

use common::{granted, status, Harness};
use leafscan_shared::capabilities::{CameraError, CameraFacing, CameraOperation, PermissionStatus};
use leafscan_shared::model::{PermissionState, PreviewMode};
use leafscan_shared::{Event, Screen, PERMISSION_SETTINGS_HINT};

#[test]
fn test_app_start_queries_permission_and_renders_blank() {
    let mut app = Harness::new();
    app.send(Event::AppStarted);

    assert_eq!(app.camera_ops(), vec![CameraOperation::CheckPermission]);
    assert_eq!(app.view().screen, Screen::Blank);
    assert!(app.renders > 0);
}

#[test]
fn test_deny_retry_grant_shows_live_camera() {
    let mut app = Harness::new();
    app.send(Event::AppStarted);
    app.resolve_camera(status(PermissionStatus::Denied));

    assert_eq!(
        app.view().screen,
        Screen::PermissionDenied {
            message: "To use this app, we need access to your camera.".into(),
            retry_label: "Grant permission".into(),
            settings_hint: None,
        }
    );
    assert!(app.camera_ops().is_empty());

    app.send(Event::PermissionRequested);
    app.send(Event::PermissionRequested);
    assert_eq!(app.camera_ops(), vec![CameraOperation::RequestPermission]);

    assert_eq!(app.resolve_camera(granted()), CameraOperation::RequestPermission);
    assert_eq!(
        app.camera_ops(),
        vec![CameraOperation::StartPreview {
            facing: CameraFacing::Back
        }]
    );

    let camera = app.camera_view();
    assert_eq!(camera.mode, PreviewMode::Live);
    assert!(camera.can_capture);
}

#[test]
fn test_repeated_grant_starts_preview_once() {
    let mut app = Harness::started();
    assert!(app.camera_ops().is_empty());

    app.send(Event::PermissionStatusReceived(Box::new(granted())));
    app.send(Event::PermissionRequested);
    app.resolve_camera(granted());

    assert!(app.camera_ops().is_empty());
    assert_eq!(app.model.permission(), PermissionState::Granted);
}

#[test]
fn test_permanent_denial_hints_at_settings() {
    let mut app = Harness::new();
    app.send(Event::AppStarted);
    app.resolve_camera(status(PermissionStatus::DeniedPermanently));

    match app.view().screen {
        Screen::PermissionDenied { settings_hint, .. } => {
            assert_eq!(settings_hint.as_deref(), Some(PERMISSION_SETTINGS_HINT));
        }
        other => panic!("unexpected screen {other:?}"),
    }
}

#[test]
fn test_not_determined_is_treated_as_denied() {
    let mut app = Harness::new();
    app.send(Event::AppStarted);
    app.resolve_camera(status(PermissionStatus::NotDetermined));

    assert!(matches!(app.view().screen, Screen::PermissionDenied { .. }));
}

#[test]
fn test_permission_query_failure_denies_with_notice() {
    let mut app = Harness::new();
    app.send(Event::AppStarted);
    app.resolve_camera(Err(CameraError::Unavailable {
        reason: "no camera service".into(),
    }));

    let view = app.view();
    assert!(matches!(view.screen, Screen::PermissionDenied { .. }));
    assert_eq!(
        view.notice.map(|n| n.error_code),
        Some("CAMERA_PERMISSION_DENIED".to_string())
    );
}

#[test]
fn test_downgrade_resets_preview_and_rearms_start() {
    let mut app = Harness::frozen();
    assert_eq!(app.model.preview_mode(), PreviewMode::Frozen);

    app.send(Event::PermissionStatusReceived(Box::new(status(
        PermissionStatus::Denied,
    ))));
    assert!(matches!(app.view().screen, Screen::PermissionDenied { .. }));
    assert_eq!(app.model.preview_mode(), PreviewMode::Live);
    assert!(app.model.pending_image().is_none());

    app.send(Event::PermissionRequested);
    app.resolve_camera(granted());
    assert_eq!(
        app.settle_preview(),
        vec![CameraOperation::StartPreview {
            facing: CameraFacing::Back
        }]
    );
    assert_eq!(app.camera_view().mode, PreviewMode::Live);
}
