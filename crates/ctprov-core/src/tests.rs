use std::cmp::Ordering;
use std::path::PathBuf;

use super::*;

#[test]
fn basename_for_x64_uses_amd64_token() {
    let basename = archive_basename("consul-template", "0.19.0", "linux", Architecture::X64);
    assert_eq!(basename, "consul-template_0.19.0_linux_amd64.zip");
}

#[test]
fn basename_for_x86_uses_386_token() {
    let basename = archive_basename("consul-template", "0.19.0", "linux", Architecture::X86);
    assert_eq!(basename, "consul-template_0.19.0_linux_386.zip");
}

#[test]
fn archive_url_substitutes_both_placeholders() {
    let basename = archive_basename("consul-template", "0.19.0", "windows", Architecture::X64);
    let url = archive_url(DEFAULT_ARCHIVE_URL, "0.19.0", &basename);
    assert_eq!(
        url,
        "https://releases.hashicorp.com/consul-template/0.19.0/consul-template_0.19.0_windows_amd64.zip"
    );
}

#[test]
fn archive_url_without_version_placeholder_only_substitutes_basename() {
    let url = archive_url("https://mirror.test/bin/{basename}", "1.0.0", "tool.zip");
    assert_eq!(url, "https://mirror.test/bin/tool.zip");
}

#[test]
fn program_file_name_is_platform_specific() {
    assert_eq!(
        program_file_name("consul-template", Platform::Posix),
        "consul-template"
    );
    assert_eq!(
        program_file_name("consul-template", Platform::Windows),
        "consul-template.exe"
    );
}

#[test]
fn version_names_must_be_plain_directory_names() {
    assert!(validate_version_name("0.19.0").is_ok());
    assert!(validate_version_name("").is_err());
    assert!(validate_version_name("  ").is_err());
    assert!(validate_version_name("..").is_err());
    assert!(validate_version_name(".").is_err());
    assert!(validate_version_name("0.19.0/../etc").is_err());
    assert!(validate_version_name(r"0.19\0").is_err());
    assert!(validate_version_name(" 0.19.0").is_err());
}

#[test]
fn compare_version_names_prefers_semver_order() {
    assert_eq!(compare_version_names("0.9.0", "0.10.0"), Ordering::Less);
    assert_eq!(compare_version_names("v1.2.0", "1.1.0"), Ordering::Greater);
    assert_eq!(compare_version_names("0.19.0", "nightly"), Ordering::Less);
    assert_eq!(compare_version_names("beta", "alpha"), Ordering::Greater);
}

#[test]
fn init_style_parses_known_values_and_falls_back_to_unmanaged() {
    assert_eq!(InitStyle::parse("systemd"), InitStyle::Systemd);
    assert_eq!(InitStyle::parse("Runit"), InitStyle::Runit);
    assert_eq!(InitStyle::parse("upstart"), InitStyle::Upstart);
    assert_eq!(InitStyle::parse("sysvinit"), InitStyle::Unmanaged);
    assert_eq!(InitStyle::parse(""), InitStyle::Unmanaged);
    assert!(!InitStyle::Unmanaged.is_managed());
    assert!(InitStyle::Systemd.is_managed());
}

#[test]
fn service_kind_depends_on_platform_and_init_style() {
    assert_eq!(
        ServiceKind::resolve(Platform::Posix, InitStyle::Systemd),
        Some(ServiceKind::Systemd)
    );
    assert_eq!(
        ServiceKind::resolve(Platform::Posix, InitStyle::Unmanaged),
        None
    );
    assert_eq!(
        ServiceKind::resolve(Platform::Windows, InitStyle::Unmanaged),
        Some(ServiceKind::Windows)
    );
}

#[test]
fn architecture_parse_accepts_common_aliases() {
    assert_eq!(Architecture::parse("amd64"), Some(Architecture::X64));
    assert_eq!(Architecture::parse("x86_64"), Some(Architecture::X64));
    assert_eq!(Architecture::parse("i686"), Some(Architecture::X86));
    assert_eq!(Architecture::parse("arm64"), None);
}

#[test]
fn archive_type_infers_from_url_ignoring_query() {
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/tool.zip?sig=abc#frag"),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/tool.TGZ"),
        Some(ArchiveType::TarGz)
    );
    assert_eq!(ArchiveType::infer_from_url("https://example.test/tool"), None);
    assert_eq!(ArchiveType::parse("tar.gz"), Some(ArchiveType::TarGz));
}

#[test]
fn parse_full_config() {
    let content = r#"
version = "0.19.0"
install_root = "/srv/consul-template"
platform = "posix"
architecture = "x86"
os = "linux"
init_style = "runit"
archive_sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"

[service]
name = "ct"
user = "ct-user"
group = "ct-group"

[config]
conf_dir = "/etc/ct.d"
template_mode = "0600"

[[config_files]]
name = "app.json"

[[config_files.templates]]
source = "/etc/ctmpl/app.ctmpl"
destination = "/etc/app/app.conf"
command = "systemctl reload app"
"#;

    let config = ProvisionConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(config.version.as_deref(), Some("0.19.0"));
    assert_eq!(config.tool_name, DEFAULT_TOOL_NAME);
    assert_eq!(
        config.resolved_install_root(),
        PathBuf::from("/srv/consul-template")
    );
    assert_eq!(config.architecture, Architecture::X86);
    assert_eq!(config.init_style, InitStyle::Runit);
    assert_eq!(config.service_name(), "ct");
    assert_eq!(config.service_kind(), Some(ServiceKind::Runit));
    assert_eq!(config.template_mode_bits().expect("mode"), 0o600);
    assert_eq!(
        config.file_ownership(),
        Some(FileOwnership {
            user: "ct-user".to_string(),
            group: "ct-group".to_string(),
        })
    );

    let config_file = config.config_file("app.json").expect("config file");
    assert_eq!(config_file.templates.len(), 1);
    let descriptor = &config_file.templates[0];
    assert_eq!(descriptor.source.as_deref(), Some("/etc/ctmpl/app.ctmpl"));
    assert_eq!(
        descriptor.options.get("command"),
        Some(&serde_json::Value::String("systemctl reload app".to_string()))
    );
}

#[test]
fn defaults_apply_for_minimal_posix_config() {
    let config =
        ProvisionConfig::from_toml_str("platform = \"posix\"\n").expect("config should parse");
    assert_eq!(config.archive_url, DEFAULT_ARCHIVE_URL);
    assert_eq!(
        config.resolved_install_root(),
        PathBuf::from("/opt/consul-template")
    );
    assert_eq!(
        config.resolved_conf_dir(),
        PathBuf::from("/etc/consul-template.d")
    );
    assert_eq!(config.init_style, InitStyle::Unmanaged);
    assert_eq!(config.service_kind(), None);
    assert_eq!(config.service_name(), "consul-template");
    assert_eq!(config.template_mode_bits().expect("mode"), 0o640);
    assert_eq!(
        config.file_ownership(),
        Some(FileOwnership {
            user: "root".to_string(),
            group: "root".to_string(),
        })
    );
}

#[test]
fn windows_config_has_no_file_ownership() {
    let config = ProvisionConfig::from_toml_str("platform = \"windows\"\ninit_style = \"systemd\"\n")
        .expect("config should parse");
    assert_eq!(config.file_ownership(), None);
    assert_eq!(config.resolved_os(), "windows");
    assert_eq!(config.service_kind(), Some(ServiceKind::Windows));
}

#[test]
fn unknown_init_style_is_unmanaged() {
    let config = ProvisionConfig::from_toml_str("platform = \"posix\"\ninit_style = \"s6\"\n")
        .expect("config should parse");
    assert_eq!(config.init_style, InitStyle::Unmanaged);
}

#[test]
fn reject_archive_url_without_basename_placeholder() {
    let err = ProvisionConfig::from_toml_str("archive_url = \"https://example.test/{version}\"\n")
        .expect_err("must reject url template");
    assert!(err.to_string().contains("{basename}"));
}

#[test]
fn reject_invalid_template_mode() {
    let err = ProvisionConfig::from_toml_str("[config]\ntemplate_mode = \"rw-r--r--\"\n")
        .expect_err("must reject mode");
    assert!(err.to_string().contains("octal"));
}

#[test]
fn reject_invalid_version_in_config() {
    assert!(ProvisionConfig::from_toml_str("version = \"../0.19.0\"\n").is_err());
}

#[test]
fn reject_malformed_checksum() {
    assert!(ProvisionConfig::from_toml_str("archive_sha256 = \"abc\"\n").is_err());
}

#[test]
fn reject_duplicate_config_file_names() {
    let content = r#"
[[config_files]]
name = "app.json"

[[config_files]]
name = "app.json"
"#;
    let err = ProvisionConfig::from_toml_str(content).expect_err("must reject duplicates");
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn descriptor_serializes_options_inline() {
    let descriptor = TemplateDescriptor::new("in.ctmpl", "out.conf")
        .with_option("perms", serde_json::json!(420));
    let rendered = serde_json::to_value(&descriptor).expect("serialize");
    assert_eq!(
        rendered,
        serde_json::json!({
            "source": "in.ctmpl",
            "destination": "out.conf",
            "perms": 420
        })
    );
}
