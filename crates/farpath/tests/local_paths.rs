//! End-to-end path API over the local backend.

use farpath::{DirPath, Error, SchemeRegistry};
use tempfile::tempdir;

fn local_root(dir: &std::path::Path) -> DirPath {
    let registry = SchemeRegistry::with_defaults();
    DirPath::new(&registry, &dir.to_string_lossy()).unwrap()
}

#[test]
fn scheme_less_strings_are_local_paths() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    assert_eq!(root.to_string(), tmp.path().to_string_lossy());
    assert!(root.exists().unwrap());
}

#[test]
fn build_is_idempotent() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());

    let nested = root.dir("a").dir("b").dir("c");
    nested.build().unwrap();
    nested.build().unwrap();
    assert!(nested.is_dir().unwrap());
}

#[test]
fn file_build_creates_the_parent_chain() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let root = local_root(tmp.path());

    let file = root.dir("deep").dir("deeper").file("leaf.txt");
    assert!(!file.exists()?);
    file.build()?;
    file.write(b"leaf")?;
    assert_eq!(file.read_text()?, "leaf");
    Ok(())
}

#[test]
fn conflicting_segment_is_reported() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    root.file("wall").write(b"brick").unwrap();

    let err = root.dir("wall").dir("beyond").build().unwrap_err();
    assert!(matches!(err, Error::ConflictingEntry(_)));
}

#[test]
fn glob_scenario_matches_expected_files() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    root.make_dirs("data/2021").unwrap();
    root.make_dirs("data/2022").unwrap();
    root.dir("data").dir("2021").file("readings_jan.csv").write(b"a").unwrap();
    root.dir("data").dir("2021").file("notes.txt").write(b"b").unwrap();
    root.dir("data").dir("2022").file("readings_feb.csv").write(b"c").unwrap();

    let mut got = root.list("data/*/readings*.csv").unwrap();
    got.sort();
    assert_eq!(
        got,
        vec!["data/2021/readings_jan.csv", "data/2022/readings_feb.csv"]
    );

    // the same names wrapped as file values, usable directly
    let files = root.files("data/*/readings*.csv").unwrap();
    assert!(files.iter().all(|f| f.is_file().unwrap()));
}

#[test]
fn empty_directory_lists_empty_not_error() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    assert!(root.list("*").unwrap().is_empty());
    assert!(root.list("a/*/b").unwrap().is_empty());
}

#[test]
fn remove_tree_then_exists_is_false() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    root.make_dirs("logs/sub").unwrap();
    root.dir("logs").file("a.txt").write(b"a").unwrap();
    root.dir("logs").dir("sub").file("b.txt").write(b"b").unwrap();

    let logs = root.dir("logs");
    logs.remove_tree().unwrap();
    assert!(!logs.exists().unwrap());
    assert!(root.exists().unwrap());
}

#[test]
fn removing_a_file_value_deletes_just_that_file() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    root.file("junk.txt").write(b"x").unwrap();
    root.file("keep.txt").write(b"y").unwrap();

    root.file("junk.txt").remove().unwrap();
    assert!(!root.file("junk.txt").exists().unwrap());
    assert!(root.file("keep.txt").exists().unwrap());
}

#[test]
fn copy_between_two_roots() -> anyhow::Result<()> {
    let src_tmp = tempdir()?;
    let dst_tmp = tempdir()?;
    let src = local_root(src_tmp.path());
    let dst = local_root(dst_tmp.path());

    src.file("payload.bin").write(&[0, 159, 146, 150])?;
    src.file("payload.bin").copy_to(&dst.file("payload.bin"))?;
    assert_eq!(dst.file("payload.bin").read()?, [0, 159, 146, 150]);
    Ok(())
}

#[test]
fn equality_is_rendered_text_plus_credential() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());

    // two independently constructed local values with one rendered text
    let again = local_root(tmp.path());
    assert_eq!(root, again);
    assert_ne!(root.dir("a"), root.dir("b"));
    // structurally different derivations, same rendered text
    assert_eq!(root.dir("a").dir("b"), root.cd("a/b"));
}

#[test]
fn metadata_queries_work_locally() {
    let tmp = tempdir().unwrap();
    let root = local_root(tmp.path());
    let file = root.file("stat.me");
    file.write(b"123456").unwrap();

    assert_eq!(file.size().unwrap(), 6);
    assert!(file.modified().is_ok());
    assert!(file.accessed().is_ok());
}
