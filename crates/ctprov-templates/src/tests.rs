use super::*;
use anyhow::anyhow;
use ctprov_core::{FileOwnership, Platform, ProvisionConfig, TemplateDescriptor};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_conf_root() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "ctprov-templates-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ))
}

fn posix_context(conf_dir: PathBuf) -> RenderContext {
    RenderContext {
        conf_dir,
        platform: Platform::Posix,
        ownership: Some(FileOwnership {
            user: "consul-template".to_string(),
            group: "consul-template".to_string(),
        }),
        mode: 0o640,
    }
}

fn app_resource() -> TemplateResource {
    TemplateResource::new(
        "app.json",
        vec![
            TemplateDescriptor::new("/etc/ctmpl/app.ctmpl", "/etc/app/app.conf")
                .with_option("command", json!("systemctl reload app")),
            TemplateDescriptor::new("/etc/ctmpl/db.ctmpl", "/etc/app/db.conf"),
        ],
    )
}

fn command_line(command: &Command) -> Vec<String> {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts
}

#[test]
fn materialize_writes_pretty_template_json() {
    let root = test_conf_root();
    let context = posix_context(root.join("conf.d"));
    let chowns = RefCell::new(Vec::new());

    let outcome = materialize_with_runner(&app_resource(), &context, |command: &mut Command| {
        chowns.borrow_mut().push(command_line(command));
        Ok(())
    })
    .expect("must render");

    let path = root.join("conf.d").join("app.json");
    assert_eq!(
        outcome,
        MaterializeOutcome::Written {
            path: path.clone(),
            templates: 2
        }
    );

    let raw = fs::read_to_string(&path).expect("must read rendered file");
    assert!(raw.contains("\n  \"template\""), "output must be pretty printed");
    let rendered: Value = serde_json::from_str(&raw).expect("must parse");
    assert_eq!(
        rendered,
        json!({
            "template": [
                {
                    "source": "/etc/ctmpl/app.ctmpl",
                    "destination": "/etc/app/app.conf",
                    "command": "systemctl reload app"
                },
                {
                    "source": "/etc/ctmpl/db.ctmpl",
                    "destination": "/etc/app/db.conf"
                }
            ]
        })
    );

    let chowns = chowns.borrow();
    assert_eq!(chowns.len(), 2, "new conf dir and rendered file are both chowned");
    assert_eq!(
        chowns[0],
        vec![
            "chown".to_string(),
            "consul-template:consul-template".to_string(),
            root.join("conf.d").display().to_string(),
        ]
    );
    assert_eq!(chowns[1][0], "chown");
    assert_eq!(chowns[1][1], "consul-template:consul-template");

    let leftovers: Vec<_> = fs::read_dir(root.join("conf.d"))
        .expect("conf dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["app.json"]);

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn materialize_applies_configured_mode() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_conf_root();
    let context = posix_context(root.clone());
    materialize_with_runner(&app_resource(), &context, |_: &mut Command| Ok(()))
        .expect("must render");

    let mode = fs::metadata(root.join("app.json"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o640);

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn new_conf_dir_is_created_world_readable() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_conf_root();
    let context = posix_context(root.join("conf.d"));
    materialize_with_runner(&app_resource(), &context, |_: &mut Command| Ok(()))
        .expect("must render");

    let mode = fs::metadata(root.join("conf.d"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn existing_conf_dir_keeps_its_mode_and_owner() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_conf_root();
    let conf_dir = root.join("conf.d");
    fs::create_dir_all(&conf_dir).expect("conf dir");
    fs::set_permissions(&conf_dir, fs::Permissions::from_mode(0o750)).expect("chmod");
    let context = posix_context(conf_dir.clone());
    let chowned = RefCell::new(Vec::new());

    materialize_with_runner(&app_resource(), &context, |command: &mut Command| {
        chowned.borrow_mut().push(command_line(command));
        Ok(())
    })
    .expect("must render");

    let chowned = chowned.borrow();
    assert_eq!(chowned.len(), 1);
    assert!(chowned[0][2].contains(".app.json.tmp-"));
    let mode = fs::metadata(&conf_dir)
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o750);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn conf_dir_ownership_failure_is_reported_for_the_directory() {
    let root = test_conf_root();
    let context = posix_context(root.join("conf.d"));

    let err = materialize_with_runner(&app_resource(), &context, |_: &mut Command| {
        Err(anyhow!("chown: invalid group: 'consul-template'"))
    })
    .expect_err("must fail");

    match err {
        TemplateError::Ownership { path, .. } => assert_eq!(path, root.join("conf.d")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!root.join("conf.d").join("app.json").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn empty_template_list_is_skipped_without_writes() {
    let root = test_conf_root();
    let context = posix_context(root.join("conf.d"));

    let outcome = materialize_with_runner(
        &TemplateResource::new("app.json", Vec::new()),
        &context,
        |_: &mut Command| panic!("chown must not run"),
    )
    .expect("must skip");

    assert_eq!(outcome, MaterializeOutcome::Skipped);
    assert!(!root.exists());
}

#[test]
fn missing_destination_is_reported_with_index_before_any_write() {
    let root = test_conf_root();
    let context = posix_context(root.clone());
    let mut resource = app_resource();
    resource.templates.push(TemplateDescriptor {
        source: Some("/etc/ctmpl/cache.ctmpl".to_string()),
        ..TemplateDescriptor::default()
    });

    let err = materialize_with_runner(&resource, &context, |_: &mut Command| Ok(()))
        .expect_err("must reject");
    match &err {
        TemplateError::MissingField {
            field,
            index,
            resource,
        } => {
            assert_eq!(*field, "destination");
            assert_eq!(*index, 2);
            assert_eq!(resource, "app.json");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("template 2 of 'app.json'"));
    assert!(!root.exists());
}

#[test]
fn blank_source_counts_as_missing() {
    let context = posix_context(test_conf_root());
    let resource = TemplateResource::new(
        "app.json",
        vec![TemplateDescriptor::new("  ", "/etc/app/app.conf")],
    );

    let err = materialize_with_runner(&resource, &context, |_: &mut Command| Ok(()))
        .expect_err("must reject");
    assert!(matches!(
        err,
        TemplateError::MissingField {
            field: "source",
            index: 0,
            ..
        }
    ));
}

#[test]
fn ownership_failure_leaves_no_rendered_file() {
    let root = test_conf_root();
    let context = posix_context(root.clone());

    let err = materialize_with_runner(&app_resource(), &context, |_: &mut Command| {
        Err(anyhow!("chown: invalid user: 'consul-template'"))
    })
    .expect_err("must fail");

    assert!(matches!(err, TemplateError::Ownership { .. }));
    assert!(!root.join("app.json").exists());
    let entries = fs::read_dir(&root).expect("conf dir").count();
    assert_eq!(entries, 0, "staged file must be cleaned up");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn windows_context_skips_ownership() {
    let root = test_conf_root();
    let mut context = posix_context(root.clone());
    context.platform = Platform::Windows;

    let outcome = materialize_with_runner(&app_resource(), &context, |_: &mut Command| {
        panic!("chown must not run on windows")
    })
    .expect("must render");
    assert!(matches!(outcome, MaterializeOutcome::Written { .. }));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn rerender_replaces_previous_content() {
    let root = test_conf_root();
    let mut context = posix_context(root.clone());
    context.ownership = None;

    materialize(&app_resource(), &context).expect("first render");
    let single = TemplateResource::new(
        "app.json",
        vec![TemplateDescriptor::new("/etc/ctmpl/only.ctmpl", "/etc/only.conf")],
    );
    materialize(&single, &context).expect("second render");

    let rendered: Value =
        serde_json::from_str(&fs::read_to_string(root.join("app.json")).expect("read"))
            .expect("parse");
    assert_eq!(rendered["template"].as_array().map(Vec::len), Some(1));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn invalid_resource_name_is_rejected() {
    let context = posix_context(test_conf_root());
    let resource = TemplateResource::new("../escape.json", Vec::new());

    let err = materialize(&resource, &context).expect_err("must reject");
    assert!(matches!(err, TemplateError::InvalidName { .. }));
}

#[test]
fn remove_rendered_is_idempotent() {
    let root = test_conf_root();
    fs::create_dir_all(&root).expect("conf dir");
    fs::write(root.join("app.json"), b"{}").expect("rendered file");

    assert!(remove_rendered("app.json", &root).expect("remove"));
    assert!(!remove_rendered("app.json", &root).expect("remove again"));
    assert!(!root.join("app.json").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn render_context_follows_config() {
    let config = ProvisionConfig::from_toml_str(
        r#"
platform = "posix"
init_style = "systemd"

[service]
user = "ct"
group = "ops"

[config]
conf_dir = "/srv/ct/conf.d"
template_mode = "0600"

[[config_files]]
name = "app.json"
[[config_files.templates]]
source = "/etc/ctmpl/app.ctmpl"
destination = "/etc/app/app.conf"
"#,
    )
    .expect("config");

    let context = RenderContext::from_config(&config).expect("context");
    assert_eq!(context.conf_dir, PathBuf::from("/srv/ct/conf.d"));
    assert_eq!(context.mode, 0o600);
    assert_eq!(
        context.ownership,
        Some(FileOwnership {
            user: "ct".to_string(),
            group: "ops".to_string()
        })
    );

    let resource = TemplateResource::from(&config.config_files[0]);
    assert_eq!(resource.name, "app.json");
    assert_eq!(resource.templates.len(), 1);
}

#[test]
fn unmanaged_init_style_renders_as_root() {
    let config = ProvisionConfig::from_toml_str("platform = \"posix\"\n").expect("config");
    let context = RenderContext::from_config(&config).expect("context");
    assert_eq!(
        context.ownership,
        Some(FileOwnership {
            user: "root".to_string(),
            group: "root".to_string()
        })
    );
}
