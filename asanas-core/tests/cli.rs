//! Command-line contract: messages, exit codes and catalog persistence.

#![allow(deprecated)]

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::TempDir;

fn asanas_cmd(cwd: &Path) -> Command {
    let mut cmd = Command::new(cargo_bin("asanas-cli"));
    cmd.current_dir(cwd).env("RUST_LOG", "warn");
    cmd
}

fn write_png(dir: &Path, name: &str, px: [u8; 3]) {
    fs::create_dir_all(dir).unwrap();
    let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
    for i in 10..90 {
        img.put_pixel(i, i, Rgb(px));
    }
    img.save(dir.join(name)).unwrap();
}

#[test]
fn missing_path_is_reported_and_fails() {
    let temp = TempDir::new().unwrap();

    asanas_cmd(temp.path())
        .args(["check", "nowhere"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ERROR: path nowhere does not exist!"));

    asanas_cmd(temp.path())
        .args(["tables", "nowhere"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ERROR: path nowhere does not exist!"));
}

#[test]
fn file_given_for_a_directory_fails() {
    let temp = TempDir::new().unwrap();
    write_png(temp.path(), "Tree_0__1.png", [0, 0, 0]);

    asanas_cmd(temp.path())
        .args(["tables", "Tree_0__1.png"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("ERROR: Tree_0__1.png is not a directory!"));

    asanas_cmd(temp.path())
        .args(["import", "Tree_0__1.png"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("is not a directory!"));
}

#[test]
fn defects_exit_with_code_two() {
    let temp = TempDir::new().unwrap();
    write_png(&temp.path().join("pict"), "Crow_0__2.png", [10, 20, 30]);

    asanas_cmd(temp.path())
        .args(["check", "pict"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("not monochrome"));

    asanas_cmd(temp.path())
        .args(["tables", "pict"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("ERRORS FOUND:"));
    assert!(!temp.path().join("test_1.jpg").exists());
}

#[test]
fn clean_tree_checks_and_exports() {
    let temp = TempDir::new().unwrap();
    write_png(&temp.path().join("pict"), "Tree_0__1.png", [0, 0, 0]);
    write_png(&temp.path().join("pict"), "Crow_1__2.png", [0, 0, 0]);

    asanas_cmd(temp.path())
        .args(["check", "pict"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    asanas_cmd(temp.path())
        .args(["tables", "pict", "--out-dir", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exported 2 images"));
    assert!(temp.path().join("out/test_1.jpg").exists());
}

#[test]
fn unusable_layout_is_an_error() {
    let temp = TempDir::new().unwrap();
    write_png(&temp.path().join("pict"), "Tree_0__1.png", [0, 0, 0]);

    asanas_cmd(temp.path())
        .args(["tables", "pict", "--cols", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));

    asanas_cmd(temp.path())
        .args(["tables", "pict", "--font", "missing.ttf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.ttf"));
}

#[test]
fn catalog_file_survives_between_imports() {
    let temp = TempDir::new().unwrap();
    write_png(&temp.path().join("pict/standing"), "Tree_0__12.png", [0, 0, 0]);

    asanas_cmd(temp.path())
        .args(["import", "pict", "--catalog", "catalog.json", "--media-root", "media"])
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 1 pictograms, rejected 0"));

    let saved = fs::read_to_string(temp.path().join("catalog.json")).unwrap();
    assert!(saved.contains("Tree"));
    let stored = temp.path().join("media/asana/pict/Tree_0.png");
    let first = fs::read(&stored).unwrap();

    asanas_cmd(temp.path())
        .args(["import", "pict", "--catalog", "catalog.json", "--media-root", "media"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Form already exists: Tree variant 0"));
    assert_eq!(fs::read(&stored).unwrap(), first);
}

#[test]
fn dry_run_leaves_catalog_file_alone() {
    let temp = TempDir::new().unwrap();
    write_png(&temp.path().join("pict"), "Tree_0__12.png", [0, 0, 0]);

    asanas_cmd(temp.path())
        .args(["import", "pict", "--dry", "--catalog", "catalog.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(dry run)"));
    assert!(!temp.path().join("catalog.json").exists());
    assert!(!temp.path().join("media").exists());
}
