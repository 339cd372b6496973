use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use ota_core::manifest::InstallManifest;
use ota_core::{Distributor, OtaConfig};
use ota_schema::{AppDescriptor, BaseUrl, FileType, MetadataStatus};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Document root with a `files/beta` group directory.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join("files/beta")).expect("failed to create group");
        Self { temp_dir }
    }

    fn root(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    fn config(&self, base_url: &str) -> OtaConfig {
        OtaConfig::new(BaseUrl::parse(base_url).unwrap(), self.root())
    }

    fn distributor(&self) -> Distributor {
        Distributor::new(self.config("https://host/"))
    }

    fn put_package(&self, rel: &str, entries: &[(&str, &[u8])]) {
        fs::write(self.root().join(rel), zip_with(entries)).expect("failed to write package");
    }

    fn resource(&self, rel: &str) -> PathBuf {
        self.root().join("files/beta").join(rel)
    }
}

fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn info_plist(display_name: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleDisplayName</key>
	<string>{display_name}</string>
	<key>CFBundleIdentifier</key>
	<string>com.example.app</string>
	<key>CFBundleShortVersionString</key>
	<string>1.2.3</string>
	<key>CFBundleVersion</key>
	<string>45</string>
</dict>
</plist>"#
    )
    .into_bytes()
}

/// `<manifest package=.. versionCode=.. versionName=..>` with a UTF-16
/// string pool, as aapt emits it.
fn android_manifest(package: &str, version_code: u32, version_name: &str) -> Vec<u8> {
    fn put16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    fn put32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    let strings = [
        "versionCode",
        "versionName",
        "package",
        "manifest",
        package,
        version_name,
    ];

    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(data.len() as u32);
        let units: Vec<u16> = s.encode_utf16().collect();
        put16(&mut data, units.len() as u16);
        for u in units {
            put16(&mut data, u);
        }
        put16(&mut data, 0);
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let mut body = Vec::new();

    // String pool.
    let strings_start = 28 + 4 * strings.len();
    put16(&mut body, 0x0001);
    put16(&mut body, 28);
    put32(&mut body, (strings_start + data.len()) as u32);
    put32(&mut body, strings.len() as u32);
    put32(&mut body, 0);
    put32(&mut body, 0);
    put32(&mut body, strings_start as u32);
    put32(&mut body, 0);
    for o in offsets {
        put32(&mut body, o);
    }
    body.extend_from_slice(&data);

    // Resource ids for versionCode / versionName.
    put16(&mut body, 0x0180);
    put16(&mut body, 8);
    put32(&mut body, 16);
    put32(&mut body, 0x0101_021b);
    put32(&mut body, 0x0101_021c);

    // <manifest> start element with three attributes.
    let attrs: [(u32, u32, u8, u32); 3] = [
        (0, u32::MAX, 0x10, version_code),
        (1, 5, 0x03, 5),
        (2, 4, 0x03, 4),
    ];
    put16(&mut body, 0x0102);
    put16(&mut body, 16);
    put32(&mut body, (16 + 20 + 20 * attrs.len()) as u32);
    put32(&mut body, 1);
    put32(&mut body, u32::MAX);
    put32(&mut body, u32::MAX);
    put32(&mut body, 3);
    put16(&mut body, 20);
    put16(&mut body, 20);
    put16(&mut body, attrs.len() as u16);
    put16(&mut body, 0);
    put16(&mut body, 0);
    put16(&mut body, 0);
    for (name, raw, kind, value) in attrs {
        put32(&mut body, u32::MAX);
        put32(&mut body, name);
        put32(&mut body, raw);
        put16(&mut body, 8);
        body.push(0);
        body.push(kind);
        put32(&mut body, value);
    }

    let mut out = Vec::new();
    put16(&mut out, 0x0003);
    put16(&mut out, 8);
    put32(&mut out, (8 + body.len()) as u32);
    out.extend_from_slice(&body);
    out
}

#[test]
fn test_ipa_end_to_end() {
    let ctx = TestContext::new();
    ctx.put_package(
        "files/beta/App.ipa",
        &[
            ("Payload/App.app/App", b"\xca\xfe\xba\xbe"),
            ("Payload/App.app/Info.plist", &info_plist("Example")),
        ],
    );

    let artifact = ctx
        .distributor()
        .process("files/beta/App.ipa", "beta")
        .unwrap();

    assert_eq!(artifact.file_type, FileType::Ipa);
    assert_eq!(artifact.file_name.as_deref(), Some("App"));
    assert_eq!(artifact.description.as_deref(), Some("description"));
    assert_eq!(
        artifact.download_url.as_deref(),
        Some(
            "itms-services://?action=download-manifest&url=https://host/files/beta/App/manifest.plist"
        )
    );

    let manifest =
        InstallManifest::from_xml(&fs::read(ctx.resource("App/manifest.plist")).unwrap()).unwrap();
    assert_eq!(manifest.asset_url(), Some("https://host/files/beta/App.ipa"));
    assert_eq!(manifest.items[0].metadata.title, "Example [1.2.3(45)]");
    assert_eq!(manifest.descriptor().as_ref(), artifact.descriptor());
}

#[test]
fn test_apk_end_to_end() {
    let ctx = TestContext::new();
    ctx.put_package(
        "files/beta/Droid.apk",
        &[
            ("classes.dex", b"dex\n035\0"),
            (
                "AndroidManifest.xml",
                &android_manifest("com.example.droid", 7, "2.0"),
            ),
        ],
    );

    let artifact = ctx
        .distributor()
        .process("files/beta/Droid.apk", "beta")
        .unwrap();

    assert_eq!(
        artifact.metadata,
        MetadataStatus::Available(AppDescriptor {
            identifier: "com.example.droid".to_string(),
            version: "2.0".to_string(),
            build_number: "7".to_string(),
            display_name: None,
        })
    );
    assert_eq!(
        artifact.download_url.as_deref(),
        Some("https://host/files/beta/Droid.apk")
    );
    assert!(ctx.resource("Droid/AndroidManifest.xml").is_file());
    assert!(!ctx.resource("Droid/manifest.plist").exists());
}

#[test]
fn test_extracted_descriptor_is_reused() {
    let ctx = TestContext::new();
    let distributor = ctx.distributor();
    ctx.put_package(
        "files/beta/App.ipa",
        &[("Payload/App.app/Info.plist", &info_plist("Example"))],
    );
    let first = distributor.process("files/beta/App.ipa", "beta").unwrap();

    // Replace the container with something unreadable; the cached
    // Info.plist means the archive is never opened again.
    fs::write(ctx.root().join("files/beta/App.ipa"), b"truncated").unwrap();
    let second = distributor.process("files/beta/App.ipa", "beta").unwrap();

    assert_eq!(first.metadata, second.metadata);
    assert!(second.descriptor().is_some());
}

#[test]
fn test_missing_entry_keeps_serving() {
    let ctx = TestContext::new();
    ctx.put_package("files/beta/App.ipa", &[("Payload/App.app/App", b"bin")]);

    let artifact = ctx
        .distributor()
        .process("files/beta/App.ipa", "beta")
        .unwrap();

    assert!(artifact.metadata.is_unavailable());
    assert_eq!(artifact.description.as_deref(), Some("description"));
    assert!(!ctx.resource("App/Info.plist").exists());
}

#[test]
fn test_description_edits_survive() {
    let ctx = TestContext::new();
    let distributor = ctx.distributor();
    ctx.put_package(
        "files/beta/App.ipa",
        &[("Payload/App.app/Info.plist", &info_plist("Example"))],
    );
    distributor.process("files/beta/App.ipa", "beta").unwrap();

    fs::write(
        ctx.resource("App/description.txt"),
        "Release notes\r\nFixed login\r\n\r\n",
    )
    .unwrap();

    for _ in 0..2 {
        let artifact = distributor.process("files/beta/App.ipa", "beta").unwrap();
        assert_eq!(
            artifact.description.as_deref(),
            Some("Release notes\nFixed login")
        );
    }
}

#[test]
fn test_markup_in_display_name() {
    let ctx = TestContext::new();
    ctx.put_package(
        "files/beta/App.ipa",
        &[(
            "Payload/App.app/Info.plist",
            &info_plist("Tom &amp; Jerry &lt;beta&gt;"),
        )],
    );

    ctx.distributor()
        .process("files/beta/App.ipa", "beta")
        .unwrap();

    let bytes = fs::read(ctx.resource("App/manifest.plist")).unwrap();
    let manifest = InstallManifest::from_xml(&bytes).unwrap();
    assert_eq!(
        manifest.items[0].metadata.title,
        "Tom & Jerry <beta> [1.2.3(45)]"
    );
}

#[test]
fn test_new_base_url_regenerates_manifest() {
    let ctx = TestContext::new();
    ctx.put_package(
        "files/beta/App.ipa",
        &[("Payload/App.app/Info.plist", &info_plist("Example"))],
    );
    ctx.distributor()
        .process("files/beta/App.ipa", "beta")
        .unwrap();

    let mirror = Distributor::new(ctx.config("http://mirror.local/"));
    let artifact = mirror.process("files/beta/App.ipa", "beta").unwrap();

    assert!(artifact.download_url.unwrap().ends_with("url=http://mirror.local/files/beta/App/manifest.plist"));
    let manifest =
        InstallManifest::from_xml(&fs::read(ctx.resource("App/manifest.plist")).unwrap()).unwrap();
    assert_eq!(
        manifest.asset_url(),
        Some("http://mirror.local/files/beta/App.ipa")
    );
}

#[test]
fn test_concurrent_requests_for_one_package() {
    let ctx = TestContext::new();
    let distributor = ctx.distributor();
    ctx.put_package(
        "files/beta/App.ipa",
        &[("Payload/App.app/Info.plist", &info_plist("Example"))],
    );

    let results = Arc::new(std::sync::Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let distributor = distributor.clone();
            let results = Arc::clone(&results);
            thread::spawn(move || {
                let artifact = distributor.process("files/beta/App.ipa", "beta").unwrap();
                results.lock().unwrap().push(artifact);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|a| a == &results[0]));
    assert!(results[0].descriptor().is_some());

    // No temporary files left behind.
    let leftovers: Vec<_> = fs::read_dir(ctx.resource("App"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_async_processing() {
    let ctx = TestContext::new();
    ctx.put_package(
        "files/beta/Droid.apk",
        &[(
            "AndroidManifest.xml",
            &android_manifest("com.example.droid", 0x10, "1.0"),
        )],
    );
    let distributor = ctx.distributor();

    let (apk, unknown) = tokio::join!(
        distributor.process_async("files/beta/Droid.apk", "beta"),
        distributor.process_async("files/beta/readme.txt", "beta"),
    );

    let apk = apk.unwrap();
    assert_eq!(apk.descriptor().unwrap().build_number, "16");
    let unknown = unknown.unwrap();
    assert_eq!(unknown.file_type, FileType::Unknown);
    assert!(!ctx.resource("readme").exists());
}
