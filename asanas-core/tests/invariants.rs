//! Contract Invariant Tests
//!
//! A defective pictogram never reaches the catalog or a sheet, and every
//! accepted one is filed, tagged and scored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::{Rgb, RgbImage};

use asanas_core::{
    catalog::{CatalogError, CatalogStore, EntityRef},
    open_catalog, save_catalog, CatalogPipeline, Config, DirectoryNameTags, ImportOptions,
    MemoryCatalog, PipelineError, TablesOutcome,
};

fn write_png(dir: &Path, name: &str, px: [u8; 3], size: u32) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut img = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
    for i in 10..size.saturating_sub(10) {
        img.put_pixel(i, i, Rgb(px));
    }
    img.save(&path).unwrap();
    path
}

fn gray(dir: &Path, name: &str) -> PathBuf {
    write_png(dir, name, [40, 40, 40], 100)
}

fn pipeline_in(root: &Path) -> CatalogPipeline {
    let mut config = Config::default();
    config.import.media_root = root.join("media");
    CatalogPipeline::new(config)
}

fn catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog.add_user("admin", true, Utc::now());
    catalog
}

#[test]
fn invariant_import_gates_on_validation() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src.join("standing"), "Tree_0__12.png");
    gray(&src.join("standing"), "Tree__nope.png");
    write_png(&src.join("standing"), "Warrior_1__20.png", [200, 10, 60], 100);
    write_png(&src.join("seated"), "Lotus_0__30.png", [0, 0, 0], 64);

    let pipeline = pipeline_in(tmp.path());
    let mut store = catalog();
    let manifest = pipeline
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions::default())
        .unwrap();

    assert_eq!(manifest.imported.len(), 1);
    assert_eq!(manifest.rejected.len(), 3);
    assert!(store.find_asana("Tree").is_some());
    assert!(store.find_asana("Warrior").is_none());
    assert!(store.find_asana("Lotus").is_none());
    assert_eq!(store.forms().count(), 1);

    let stored = fs::read_dir(tmp.path().join("media/asana/pict")).unwrap().count();
    assert_eq!(stored, 1);
}

#[test]
fn invariant_accepted_forms_are_tagged_and_scored() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    let original = gray(&src.join("balance"), "Downward_Dog_2__35.png");

    let pipeline = pipeline_in(tmp.path());
    let mut store = catalog();
    let manifest = pipeline
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions::default())
        .unwrap();

    let entry = &manifest.imported[0];
    assert_eq!(entry.name, "Downward Dog");
    assert_eq!(entry.variant, 2);
    assert_eq!(entry.score, 35);
    assert_eq!(entry.tag.as_deref(), Some("balance"));
    assert!(entry.stored.ends_with("asana/pict/Downward Dog_2.png"));
    assert_eq!(fs::read(&entry.stored).unwrap(), fs::read(&original).unwrap());

    let form = entry.form.unwrap();
    let tags: Vec<_> = store.tags_for(form).iter().map(|t| t.name.clone()).collect();
    assert_eq!(tags, vec!["balance"]);

    let owner = store.earliest_superuser().unwrap();
    let difficulty = store.get_or_create_score("difficulty", 0, 40, owner).unwrap();
    assert_eq!(store.value_of(difficulty, form), Some(35));
    assert_eq!(store.form_name(form.id).as_deref(), Some("Downward Dog 2"));
    assert_eq!(store.form(form.id).unwrap().pict.sha256, entry.sha256);
}

#[test]
fn invariant_dry_run_touches_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src, "Tree_0__12.png");

    let pipeline = pipeline_in(tmp.path());
    let mut store = MemoryCatalog::new();
    let manifest = pipeline
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions { dry_run: true })
        .unwrap();

    assert!(manifest.dry_run);
    assert_eq!(manifest.imported.len(), 1);
    assert!(manifest.imported[0].form.is_none());
    assert_eq!(store.forms().count(), 0);
    assert!(!tmp.path().join("media").exists());
}

#[test]
fn invariant_store_errors_abort_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src.join("a"), "tree_0__3.png");
    gray(&src.join("b"), "tree_0__5.png");

    let pipeline = pipeline_in(tmp.path());
    let mut store = catalog();
    let err = pipeline
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions::default())
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Catalog(CatalogError::DuplicateForm { variant: 0, .. })
    ));
}

#[test]
fn invariant_reimport_from_saved_catalog_is_a_duplicate() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src.join("standing"), "Tree_0__12.png");
    let pipeline = pipeline_in(tmp.path());
    let catalog_file = tmp.path().join("catalog.json");

    let mut store = open_catalog(&catalog_file).unwrap();
    store.add_user("admin", true, Utc::now());
    pipeline
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions::default())
        .unwrap();
    save_catalog(&store, &catalog_file).unwrap();

    let stored = tmp.path().join("media/asana/pict/Tree_0.png");
    let first = fs::read(&stored).unwrap();

    // A different picture under the same name must not replace the stored one.
    fs::remove_file(src.join("standing/Tree_0__12.png")).unwrap();
    write_png(&src.join("standing"), "Tree_0__12.png", [90, 90, 90], 100);

    let mut reopened = open_catalog(&catalog_file).unwrap();
    assert!(reopened.user_by_name("admin").is_some());
    assert_eq!(reopened.forms().count(), 1);
    let err = pipeline
        .import_dir(&src, &mut reopened, &DirectoryNameTags, ImportOptions::default())
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Catalog(CatalogError::DuplicateForm { variant: 0, .. })
    ));
    assert_eq!(fs::read(&stored).unwrap(), first);
    let names: Vec<_> = fs::read_dir(tmp.path().join("media/asana/pict"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec!["Tree_0.png"]);
}

#[test]
fn invariant_unwritable_upload_dir_records_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src, "Tree_0__12.png");
    fs::create_dir_all(tmp.path().join("media")).unwrap();
    fs::write(tmp.path().join("media/asana"), b"in the way").unwrap();

    let mut store = catalog();
    let err = pipeline_in(tmp.path())
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions::default())
        .unwrap_err();

    assert!(matches!(err, PipelineError::Io { .. }));
    assert_eq!(store.forms().count(), 0);
    assert!(store.find_asana("Tree").is_none());
}

#[test]
fn invariant_import_needs_an_owner() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src, "tree_0__3.png");

    let mut store = MemoryCatalog::new();
    store.add_user("guest", false, Utc::now());
    let err = pipeline_in(tmp.path())
        .import_dir(&src, &mut store, &DirectoryNameTags, ImportOptions::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Catalog(CatalogError::NoOwner)));
}

#[test]
fn invariant_injected_tag_mapping() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src.join("inv"), "Headstand_0__30.png");

    let mut tags = BTreeMap::new();
    tags.insert(src.join("inv"), "Inversions".to_string());

    let mut store = catalog();
    let manifest = pipeline_in(tmp.path())
        .import_dir(&src, &mut store, &tags, ImportOptions::default())
        .unwrap();

    let form: EntityRef = manifest.imported[0].form.unwrap();
    assert_eq!(store.tags_for(form)[0].name, "Inversions");
}

#[test]
fn invariant_manifest_hash_present() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("pict");
    gray(&src, "Tree_0__12.png");

    let manifest = pipeline_in(tmp.path())
        .import_dir(&src, &mut catalog(), &DirectoryNameTags, ImportOptions { dry_run: true })
        .unwrap();
    assert_eq!(manifest.manifest_hash.len(), 64);
    assert!(!manifest.run_id.is_empty());
}

#[test]
fn invariant_import_requires_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let file = gray(tmp.path(), "Tree_0__12.png");
    let pipeline = pipeline_in(tmp.path());

    let err = pipeline
        .import_dir(&file, &mut catalog(), &DirectoryNameTags, ImportOptions::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotADirectory(_)));

    let err = pipeline.build_tables(&tmp.path().join("missing")).unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[test]
fn invariant_tables_refuse_defective_input() {
    let tmp = tempfile::tempdir().unwrap();
    gray(tmp.path(), "Tree_0__1.png");
    write_png(tmp.path(), "Crow_0__2.png", [10, 20, 30], 100);

    match CatalogPipeline::default().build_tables(tmp.path()).unwrap() {
        TablesOutcome::Rejected(reports) => {
            assert_eq!(reports.len(), 1);
            assert!(reports[0].defects[0].message.ends_with("not monochrome"));
        }
        TablesOutcome::Composed(_) => panic!("defective input must not be laid out"),
    }
}

#[test]
fn invariant_tables_paginate_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..37 {
        gray(tmp.path(), &format!("pose{:02}_{}__1.png", i, i % 3));
    }

    match CatalogPipeline::default().build_tables(tmp.path()).unwrap() {
        TablesOutcome::Composed(sheet) => {
            assert_eq!(sheet.image_count, 37);
            assert_eq!(sheet.pages.len(), 2);
            assert_eq!(sheet.pages[1].placed, 1);
        }
        TablesOutcome::Rejected(r) => panic!("unexpected defects: {:?}", r),
    }
}
