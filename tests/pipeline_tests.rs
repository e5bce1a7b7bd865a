//! End-to-end tests of the asset pipeline: discovery, atlas caching and
//! sequence construction on a pack written to a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use deskpet::assets::{Activity, AssetIndex, AssetPack, PetState, Transition};
use deskpet::cache::{read_cache_entries, CacheBuild};
use deskpet::gfx::GfxService;
use deskpet::sheet::{FrameRect, LoadStrategy};
use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn write_frame(path: &Path, size: u32, color: Rgba<u8>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(size, size, color).save(path).unwrap();
}

/// A small pack: a three-phase head touch plus idle and startup loops.
fn seed_pack(temp: &TempDir) -> PathBuf {
    let vup = temp.path().join("VPetSimulator/vup");
    let red = Rgba([255, 0, 0, 255]);
    let green = Rgba([0, 255, 0, 255]);
    let blue = Rgba([0, 0, 255, 255]);
    write_frame(&vup.join("Happy/Touch_Head/A_Start/th_000_100.png"), 16, red);
    write_frame(&vup.join("Happy/Touch_Head/A_Start/th_001_250.png"), 16, green);
    write_frame(&vup.join("Happy/Touch_Head/A_Start/th_002_100.png"), 16, blue);
    write_frame(&vup.join("Happy/Touch_Head/B_Loop/th_000_125.png"), 16, red);
    write_frame(&vup.join("Happy/Touch_Head/C_End/th_000_125.png"), 16, red);
    write_frame(&vup.join("Default/Nomal/idle_000_50.png"), 16, green);
    write_frame(&vup.join("Startup/Nomal/boot_000_50.png"), 16, blue);
    vup
}

fn load(gfx_root: &Path, cache_dir: &Path, cell_size: u32) -> GfxService {
    let mut gfx = GfxService::new().with_cache_jobs(2);
    gfx.init(gfx_root).unwrap();
    gfx.create_sprite_sheet_cache_if_not_exists(cache_dir, cell_size, &|_| {})
        .unwrap();
    gfx.create_animation_sequences_info(cell_size).unwrap();
    gfx
}

#[test]
fn test_locate_then_discover() {
    let temp = TempDir::new().unwrap();
    seed_pack(&temp);

    let pack = AssetPack::locate(temp.path(), "VPetSimulator", &["vup"]).unwrap();
    let index = AssetIndex::discover(&pack.gfx_root).unwrap();
    assert_eq!(index.len(), 5);

    let touch: Vec<_> = index
        .all_assets()
        .filter(|(key, _)| key.activity == Activity::TouchHead)
        .map(|(key, _)| (key.state, key.transition))
        .collect();
    assert_eq!(touch.len(), 3);
    assert!(touch.iter().all(|(state, _)| *state == PetState::Happy));
    for transition in [Transition::Start, Transition::Loop, Transition::End] {
        assert!(touch.iter().any(|(_, t)| *t == transition), "missing {:?}", transition);
    }
}

#[test]
fn test_sequence_duration_and_atlas_geometry() {
    let temp = TempDir::new().unwrap();
    let vup = seed_pack(&temp);
    let cache_dir = temp.path().join("cache");
    let gfx = load(&vup, &cache_dir, 8);

    let sequence = gfx
        .sequence_for_source(Path::new("Happy/Touch_Head/A_Start"))
        .expect("sequence for the start phase");
    let delays: Vec<u32> = sequence.frames().iter().map(|f| f.delay_ms).collect();
    assert_eq!(delays, vec![100, 250, 100]);
    assert_eq!(sequence.duration_ms(), 450);

    for (i, frame) in sequence.frames().iter().enumerate() {
        assert_eq!(frame.area, FrameRect::cell(i, 8));
        for other in &sequence.frames()[i + 1..] {
            assert!(!frame.area.overlaps(&other.area));
        }
    }

    gfx.preload_all_sequences(LoadStrategy::Eager).unwrap();
    let atlas = sequence.sprite().unwrap().instance().unwrap();
    assert_eq!(atlas.dimensions(), (24, 8));
    // Cells keep the order of the frame files.
    assert_eq!(*atlas.get_pixel(4, 4), Rgba([255, 0, 0, 255]));
    assert_eq!(*atlas.get_pixel(12, 4), Rgba([0, 255, 0, 255]));
    assert_eq!(*atlas.get_pixel(20, 4), Rgba([0, 0, 255, 255]));
}

#[test]
fn test_second_pass_reuses_cache() {
    let temp = TempDir::new().unwrap();
    let vup = seed_pack(&temp);
    let cache_dir = temp.path().join("cache");
    let index = AssetIndex::discover(&vup).unwrap();
    let sources: Vec<PathBuf> = index.all_paths().map(Path::to_path_buf).collect();

    let first = CacheBuild::new(&vup, &cache_dir, 8).run(&sources, &|_| {}).unwrap();
    assert_eq!((first.built, first.reused), (5, 0));

    let second = CacheBuild::new(&vup, &cache_dir, 8).run(&sources, &|_| {}).unwrap();
    assert_eq!((second.built, second.reused), (0, 5));
    assert_eq!(first.entries, second.entries);

    let forced = CacheBuild::new(&vup, &cache_dir, 8)
        .with_force(true)
        .run(&sources, &|_| {})
        .unwrap();
    assert_eq!(forced.built, 5);

    assert_eq!(read_cache_entries(&cache_dir).unwrap().len(), 5);
}

#[test]
fn test_cell_size_change_rebuilds() {
    let temp = TempDir::new().unwrap();
    let vup = seed_pack(&temp);
    let cache_dir = temp.path().join("cache");
    let index = AssetIndex::discover(&vup).unwrap();
    let sources: Vec<PathBuf> = index.all_paths().map(Path::to_path_buf).collect();

    CacheBuild::new(&vup, &cache_dir, 8).run(&sources, &|_| {}).unwrap();
    let resized = CacheBuild::new(&vup, &cache_dir, 4).run(&sources, &|_| {}).unwrap();
    assert_eq!(resized.built, 5);

    let gfx = load(&vup, &cache_dir, 4);
    gfx.preload_all_sequences(LoadStrategy::Lazy).unwrap();
    let sequence = gfx.sequence_for_source(Path::new("Default/Nomal")).unwrap();
    assert_eq!(sequence.sprite().unwrap().instance().unwrap().dimensions(), (4, 4));
}

#[test]
fn test_search_sequences_by_key() {
    let temp = TempDir::new().unwrap();
    let vup = seed_pack(&temp);
    let gfx = load(&vup, &temp.path().join("cache"), 8);

    assert_eq!(gfx.sequence_count(), 5);
    let happy = gfx.search_sequences(|key| key.state == PetState::Happy);
    assert_eq!(happy.len(), 3);
    let startup = gfx.search_sequences(|key| key.activity == Activity::Startup);
    assert_eq!(startup.len(), 1);
    assert!(startup[0].name().starts_with("boot Startup"), "{}", startup[0].name());
}

#[test]
fn test_phases_get_distinct_sequence_names() {
    let temp = TempDir::new().unwrap();
    let vup = seed_pack(&temp);
    let gfx = load(&vup, &temp.path().join("cache"), 8);

    let touch = gfx.search_sequences_with_keys(|key| key.activity == Activity::TouchHead);
    assert_eq!(touch.len(), 3);
    for (key, sequence) in &touch {
        assert_eq!(sequence.name(), key.to_string());
        assert!(sequence.name().ends_with(&key.transition.to_string()));
    }
    let mut names: Vec<&str> = touch.iter().map(|(_, sequence)| sequence.name()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 3);
}
