//! End-to-end transaction scenarios against throwaway install roots, with
//! real archives, databases and filesystems.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use md5::{Digest, Md5};

use libpact::{operation, Error, Event, FileConflictKind, Package, PackageReason, Session, TransFlag};

fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Fixture {
        Self::with_config(r#"{ "check_space": false, "repos": [{ "name": "core" }] }"#)
    }

    fn with_config(extra: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture { dir };
        for sub in ["var/lib/pact/local", "var/lib/pact/sync", "var/cache/pact/pkg"] {
            std::fs::create_dir_all(fixture.root().join(sub)).unwrap();
        }
        let config = extra.replacen(
            '{',
            &format!("{{ \"root\": {:?},", fixture.root().display().to_string()),
            1,
        );
        std::fs::write(fixture.config_path(), config).unwrap();
        fixture
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config_path(&self) -> PathBuf {
        self.root().join("config.json")
    }

    fn session(&self) -> Session {
        Session::new_with(self.config_path()).unwrap()
    }

    /// Put a package into the local db and materialize its files on disk.
    fn install_local(&self, pkg: &Package, contents: &[(&str, &str)]) {
        let entry = self
            .root()
            .join("var/lib/pact/local")
            .join(format!("{}-{}", pkg.name, pkg.version));
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("desc"), serde_json::to_vec_pretty(pkg).unwrap()).unwrap();

        let mut files = std::fs::File::create(entry.join("files")).unwrap();
        for entry in pkg.files.iter() {
            writeln!(files, "{}\t{:o}\t{}", entry.path, 0o644, entry.size).unwrap();
        }

        for (path, content) in contents {
            let full = self.root().join(path);
            if path.ends_with('/') {
                std::fs::create_dir_all(&full).unwrap();
            } else {
                std::fs::create_dir_all(full.parent().unwrap()).unwrap();
                std::fs::write(&full, content).unwrap();
            }
        }
    }

    /// Write a repo index and drop each package's archive into the cache.
    fn write_sync(&self, repo: &str, pkgs: &[&Package]) {
        let index = self
            .root()
            .join("var/lib/pact/sync")
            .join(format!("{}.json", repo));
        let records = pkgs.iter().map(|p| (*p).clone()).collect::<Vec<_>>();
        std::fs::write(index, serde_json::to_vec_pretty(&records).unwrap()).unwrap();
    }

    fn make_archive(&self, pkg: &Package, contents: &[(&str, &str)]) {
        let filename = pkg.filename.clone().expect("sync package needs a filename");
        let path = self.root().join("var/cache/pact/pkg").join(filename);
        let gz = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(gz);

        let info = serde_json::to_vec(pkg).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(info.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, ".PKGINFO", &info[..]).unwrap();

        for (path, content) in contents {
            let mut header = tar::Header::new_gnu();
            if path.ends_with('/') {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                header.set_cksum();
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            } else {
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_bytes())
                    .unwrap();
            }
        }
        builder.into_inner().unwrap().finish().unwrap();
    }
}

fn pkg(name: &str, version: &str) -> Package {
    Package {
        name: name.to_owned(),
        version: version.to_owned(),
        ..Default::default()
    }
}

fn sync_pkg(name: &str, version: &str, paths: &[&str]) -> Package {
    let mut p = pkg(name, version);
    p.filename = Some(format!("{}-{}.pkg.tar.gz", name, version));
    p.files = paths.iter().map(|s| libpact::FileEntry::new(s)).collect();
    p
}

fn local_pkg(name: &str, version: &str, paths: &[&str]) -> Package {
    let mut p = pkg(name, version);
    p.files = paths.iter().map(|s| libpact::FileEntry::new(s)).collect();
    p
}

fn installed_names(session: &Session) -> Vec<(String, PackageReason)> {
    operation::package_query(session, &[], &[], true)
        .unwrap()
        .into_iter()
        .map(|p| (p.name, p.reason))
        .collect()
}

#[test]
fn simple_install_pulls_dependency_first() {
    let fixture = Fixture::new();

    let mut foo = sync_pkg("foo", "1.0-1", &["usr/", "usr/bin/", "usr/bin/foo"]);
    foo.depends = vec!["bar>=1".parse().unwrap()];
    let bar = sync_pkg("bar", "1.0-1", &["usr/", "usr/lib/", "usr/lib/libbar.so"]);

    fixture.write_sync("core", &[&foo, &bar]);
    fixture.make_archive(&foo, &[("usr/", ""), ("usr/bin/", ""), ("usr/bin/foo", "#!foo")]);
    fixture.make_archive(&bar, &[("usr/", ""), ("usr/lib/", ""), ("usr/lib/libbar.so", "ELF")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_sync_targets(&session, &["foo"]).unwrap();
    operation::trans_prepare(&session).unwrap();

    let summary = operation::trans_summary(&session).unwrap();
    let order = summary.install.iter().map(|i| i.name.as_str()).collect::<Vec<_>>();
    assert_eq!(order, ["bar", "foo"]);
    assert!(summary.remove.is_empty());
    // both archives are cached, nothing to download
    assert_eq!(summary.download_size, 0);

    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    assert!(fixture.root().join("usr/bin/foo").is_file());
    assert!(fixture.root().join("usr/lib/libbar.so").is_file());

    let installed = installed_names(&session);
    assert!(installed.contains(&("foo".into(), PackageReason::Explicit)));
    assert!(installed.contains(&("bar".into(), PackageReason::Depend)));
}

#[test]
fn sysupgrade_replacement_inherits_reason() {
    let fixture = Fixture::new();

    let oldpkg = local_pkg("oldpkg", "1.0-1", &["usr/", "usr/bin/", "usr/bin/old"]);
    fixture.install_local(&oldpkg, &[("usr/bin/old", "#!old")]);

    let mut newpkg = sync_pkg("newpkg", "2.0-1", &["usr/", "usr/bin/", "usr/bin/new"]);
    newpkg.replaces = vec!["oldpkg".parse().unwrap()];
    fixture.write_sync("core", &[&newpkg]);
    fixture.make_archive(&newpkg, &[("usr/", ""), ("usr/bin/", ""), ("usr/bin/new", "#!new")]);

    let session = fixture.session();

    // answer the replacement question from a frontend thread
    let rx = session.event_bus().receiver();
    let tx = session.event_bus().sender();
    let answerer = std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            if let Event::PromptReplacePackage(_) = event {
                let _ = tx.send(Event::PromptReplacePackageResult(true));
            }
        }
    });

    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_sysupgrade(&session, false).unwrap();
    operation::trans_prepare(&session).unwrap();

    let summary = operation::trans_summary(&session).unwrap();
    assert_eq!(summary.install.len(), 1);
    assert_eq!(summary.install[0].name, "newpkg");
    assert_eq!(summary.remove, ["oldpkg-1.0-1".to_string()]);

    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    assert!(!fixture.root().join("usr/bin/old").exists());
    assert!(fixture.root().join("usr/bin/new").is_file());

    let installed = installed_names(&session);
    assert_eq!(installed.len(), 1);
    // the replacer inherits the replaced package's explicit reason
    assert_eq!(installed[0], ("newpkg".into(), PackageReason::Explicit));

    drop(session);
    let _ = answerer.join();
}

#[test]
fn cascade_remove_orders_dependents_first() {
    let fixture = Fixture::new();

    let mut a = local_pkg("a", "1.0-1", &["usr/", "usr/bin/", "usr/bin/a"]);
    a.depends = vec!["b".parse().unwrap()];
    let b = local_pkg("b", "1.0-1", &["usr/", "usr/bin/", "usr/bin/b"]);
    fixture.install_local(&a, &[("usr/bin/a", "a")]);
    fixture.install_local(&b, &[("usr/bin/b", "b")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![TransFlag::Cascade]).unwrap();
    operation::trans_remove_targets(&session, &["b"]).unwrap();
    operation::trans_prepare(&session).unwrap();

    let summary = operation::trans_summary(&session).unwrap();
    assert_eq!(summary.remove, ["a-1.0-1".to_string(), "b-1.0-1".to_string()]);

    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    assert!(installed_names(&session).is_empty());
    assert!(!fixture.root().join("usr/bin/a").exists());
    assert!(!fixture.root().join("usr/bin/b").exists());
}

#[test]
fn unneeded_remove_keeps_needed_target() {
    let fixture = Fixture::new();

    let mut a = local_pkg("a", "1.0-1", &["usr/", "usr/bin/", "usr/bin/a"]);
    a.depends = vec!["b".parse().unwrap()];
    let b = local_pkg("b", "1.0-1", &["usr/", "usr/bin/", "usr/bin/b"]);
    let mut c = local_pkg("c", "1.0-1", &["usr/", "usr/bin/", "usr/bin/c"]);
    c.depends = vec!["b".parse().unwrap()];
    fixture.install_local(&a, &[("usr/bin/a", "a")]);
    fixture.install_local(&b, &[("usr/bin/b", "b")]);
    fixture.install_local(&c, &[("usr/bin/c", "c")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![TransFlag::Unneeded]).unwrap();
    operation::trans_remove_targets(&session, &["a", "b"]).unwrap();
    operation::trans_prepare(&session).unwrap();

    // b is still needed by c and gets dropped from the target list
    let summary = operation::trans_summary(&session).unwrap();
    assert_eq!(summary.remove, ["a-1.0-1".to_string()]);

    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    let names = installed_names(&session)
        .into_iter()
        .map(|(n, _)| n)
        .collect::<Vec<_>>();
    assert_eq!(names, ["b", "c"]);
}

#[test]
fn modified_backup_file_is_preserved() {
    let fixture = Fixture::new();

    let mut pkg = local_pkg("srv", "1.0-1", &["etc/", "etc/srv.conf"]);
    pkg.backup = vec![libpact::Backup {
        path: "etc/srv.conf".into(),
        hash: md5_hex(b"original\n"),
    }];
    fixture.install_local(&pkg, &[("etc/srv.conf", "locally modified\n")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_remove_targets(&session, &["srv"]).unwrap();
    operation::trans_prepare(&session).unwrap();
    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    let conf = fixture.root().join("etc/srv.conf");
    let saved = fixture.root().join("etc/srv.conf.pacsave");
    assert!(!conf.exists());
    assert!(saved.is_file());
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "locally modified\n");
    // the directory still holds the .pacsave and is retained
    assert!(fixture.root().join("etc").is_dir());
}

#[test]
fn nosave_unlinks_modified_backup_file() {
    let fixture = Fixture::new();

    let mut pkg = local_pkg("srv", "1.0-1", &["etc/", "etc/srv.conf"]);
    pkg.backup = vec![libpact::Backup {
        path: "etc/srv.conf".into(),
        hash: md5_hex(b"original\n"),
    }];
    fixture.install_local(&pkg, &[("etc/srv.conf", "locally modified\n")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![TransFlag::NoSave]).unwrap();
    operation::trans_remove_targets(&session, &["srv"]).unwrap();
    operation::trans_prepare(&session).unwrap();
    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    assert!(!fixture.root().join("etc/srv.conf").exists());
    assert!(!fixture.root().join("etc/srv.conf.pacsave").exists());
}

#[test]
fn file_conflict_aborts_commit_without_mutation() {
    let fixture = Fixture::new();

    let a = local_pkg("a", "1.0-1", &["usr/", "usr/bin/", "usr/bin/x"]);
    fixture.install_local(&a, &[("usr/bin/x", "owned by a")]);

    let b = sync_pkg("b", "1.0-1", &["usr/", "usr/bin/", "usr/bin/x"]);
    fixture.write_sync("core", &[&b]);
    fixture.make_archive(&b, &[("usr/", ""), ("usr/bin/", ""), ("usr/bin/x", "owned by b")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_sync_targets(&session, &["b"]).unwrap();
    operation::trans_prepare(&session).unwrap();

    match operation::trans_commit(&session) {
        Err(Error::FileConflicts(conflicts)) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].kind, FileConflictKind::Filesystem);
            assert_eq!(conflicts[0].path, "usr/bin/x");
            assert_eq!(conflicts[0].conflicting_target.as_deref(), Some("a"));
        }
        other => panic!("expected a file conflict, got {:?}", other.err()),
    }
    operation::trans_release(&session).unwrap();

    // neither the filesystem nor the database moved
    assert_eq!(
        std::fs::read_to_string(fixture.root().join("usr/bin/x")).unwrap(),
        "owned by a"
    );
    let names = installed_names(&session)
        .into_iter()
        .map(|(n, _)| n)
        .collect::<Vec<_>>();
    assert_eq!(names, ["a"]);
}

#[test]
fn prepare_is_deterministic_across_sessions() {
    let fixture = Fixture::new();

    let mut app = sync_pkg("app", "1.0-1", &["usr/", "usr/bin/", "usr/bin/app"]);
    app.depends = vec!["libz".parse().unwrap(), "liby".parse().unwrap()];
    let libz = sync_pkg("libz", "1.0-1", &["usr/", "usr/lib/", "usr/lib/libz.so"]);
    let liby = sync_pkg("liby", "1.0-1", &["usr/", "usr/lib/", "usr/lib/liby.so"]);
    fixture.write_sync("core", &[&app, &libz, &liby]);
    for (p, f) in [(&app, "usr/bin/app"), (&libz, "usr/lib/libz.so"), (&liby, "usr/lib/liby.so")]
    {
        fixture.make_archive(p, &[("usr/", ""), (f, "x")]);
    }

    let plan = |session: &Session| {
        operation::trans_init(session, vec![]).unwrap();
        operation::trans_sync_targets(session, &["app"]).unwrap();
        operation::trans_prepare(session).unwrap();
        let summary = operation::trans_summary(session).unwrap();
        operation::trans_release(session).unwrap();
        (
            summary
                .install
                .iter()
                .map(|i| (i.name.clone(), i.new_version.clone()))
                .collect::<Vec<_>>(),
            summary.remove,
        )
    };

    let first = plan(&fixture.session());
    let second = plan(&fixture.session());
    assert_eq!(first, second);
    // the target itself comes last
    assert_eq!(first.0.last().unwrap().0, "app");
}

#[test]
fn skip_remove_globs_protect_paths() {
    let fixture = Fixture::with_config(
        r#"{ "check_space": false, "skip_remove": ["etc/protected*"], "repos": [] }"#,
    );

    let pkg = local_pkg(
        "tool",
        "1.0-1",
        &["etc/", "etc/protected.conf", "usr/", "usr/bin/", "usr/bin/tool"],
    );
    fixture.install_local(&pkg, &[("etc/protected.conf", "keep me"), ("usr/bin/tool", "x")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_remove_targets(&session, &["tool"]).unwrap();
    operation::trans_prepare(&session).unwrap();
    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    assert!(fixture.root().join("etc/protected.conf").is_file());
    assert!(!fixture.root().join("usr/bin/tool").exists());
    assert!(installed_names(&session).is_empty());
}

#[test]
fn needed_flag_skips_up_to_date_target() {
    let fixture = Fixture::new();

    let installed = local_pkg("tool", "1.0-1", &["usr/", "usr/bin/", "usr/bin/tool"]);
    fixture.install_local(&installed, &[("usr/bin/tool", "x")]);
    let synced = sync_pkg("tool", "1.0-1", &["usr/", "usr/bin/", "usr/bin/tool"]);
    fixture.write_sync("core", &[&synced]);

    let session = fixture.session();
    operation::trans_init(&session, vec![TransFlag::Needed]).unwrap();
    operation::trans_sync_targets(&session, &["tool"]).unwrap();
    operation::trans_prepare(&session).unwrap();
    let summary = operation::trans_summary(&session).unwrap();
    assert!(summary.install.is_empty());
    assert!(summary.remove.is_empty());
    operation::trans_release(&session).unwrap();
}

#[test]
fn upgrade_preserves_modified_backup_as_pacnew() {
    let fixture = Fixture::new();

    let mut old = local_pkg(
        "tool",
        "1.0-1",
        &["etc/", "etc/tool.conf", "usr/", "usr/bin/", "usr/bin/tool"],
    );
    old.backup = vec![libpact::Backup {
        path: "etc/tool.conf".into(),
        hash: md5_hex(b"default v1\n"),
    }];
    fixture.install_local(&old, &[("etc/tool.conf", "user edited\n"), ("usr/bin/tool", "v1")]);

    let mut new = sync_pkg(
        "tool",
        "2.0-1",
        &["etc/", "etc/tool.conf", "usr/", "usr/bin/", "usr/bin/tool"],
    );
    new.backup = vec![libpact::Backup {
        path: "etc/tool.conf".into(),
        hash: String::new(),
    }];
    fixture.write_sync("core", &[&new]);
    fixture.make_archive(
        &new,
        &[
            ("etc/", ""),
            ("etc/tool.conf", "default v2\n"),
            ("usr/", ""),
            ("usr/bin/", ""),
            ("usr/bin/tool", "v2"),
        ],
    );

    let session = fixture.session();
    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_sync_targets(&session, &["tool"]).unwrap();
    operation::trans_prepare(&session).unwrap();
    operation::trans_commit(&session).unwrap();
    operation::trans_release(&session).unwrap();

    assert_eq!(
        std::fs::read_to_string(fixture.root().join("usr/bin/tool")).unwrap(),
        "v2"
    );
    // the user's edit survives, the incoming payload is parked beside it
    assert_eq!(
        std::fs::read_to_string(fixture.root().join("etc/tool.conf")).unwrap(),
        "user edited\n"
    );
    assert_eq!(
        std::fs::read_to_string(fixture.root().join("etc/tool.conf.pacnew")).unwrap(),
        "default v2\n"
    );

    let installed = operation::package_query(&session, &[], &[], true).unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].version, "2.0-1");
}

#[test]
fn corrupted_archive_fails_commit() {
    let fixture = Fixture::new();

    let mut evil = sync_pkg("evil", "1.0-1", &["usr/", "usr/bin/", "usr/bin/evil"]);
    evil.validation = vec![libpact::Validation::Sha256];
    evil.sha256sum = Some("deadbeef".repeat(8));
    fixture.write_sync("core", &[&evil]);
    fixture.make_archive(&evil, &[("usr/", ""), ("usr/bin/", ""), ("usr/bin/evil", "x")]);

    let session = fixture.session();
    operation::trans_init(&session, vec![]).unwrap();
    operation::trans_sync_targets(&session, &["evil"]).unwrap();
    operation::trans_prepare(&session).unwrap();

    // without a frontend the delete-corrupted question defaults to no
    assert!(matches!(
        operation::trans_commit(&session),
        Err(Error::InvalidPackages(_))
    ));
    operation::trans_release(&session).unwrap();

    assert!(installed_names(&session).is_empty());
    assert!(!fixture.root().join("usr/bin/evil").exists());
}

#[test]
fn lock_is_exclusive_and_released() {
    let fixture = Fixture::new();
    let session = fixture.session();
    let other = fixture.session();

    operation::trans_init(&session, vec![]).unwrap();
    assert!(matches!(
        operation::trans_init(&other, vec![]),
        Err(Error::HandleLock(_))
    ));
    operation::trans_release(&session).unwrap();
    operation::trans_init(&other, vec![]).unwrap();
    operation::trans_release(&other).unwrap();
}
