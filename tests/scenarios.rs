use std::sync::Arc;

use putget_conformance::{
    access::AccessPattern,
    collective::SingleTask,
    data_type::{bytes_to_elements, elements_to_bytes, ElementKind},
    driver::{MatrixCell, PutGetDriver},
    fixtures::{Fixtures, ARRAY_NUM_ELEMENTS},
    schema::{create_putget_file, putget_filename},
    storage::{DatasetStorage, DimId, Flavor, OpenMode, StoreDatasetStorage, VarId},
    store::{MemoryStore, ReadableWritableListableStorage},
};

const START: [u64; 3] = [0, 0, 0];
const COUNT: [u64; 3] = [1, 40, 40];
const STRIDE: [u64; 3] = [1, 1, 1];

fn memory_storage() -> StoreDatasetStorage<MemoryStore> {
    StoreDatasetStorage::new(Arc::new(MemoryStore::new()))
}

#[test]
fn scenario_rectangular_int32() -> Result<(), Box<dyn std::error::Error>> {
    let storage = memory_storage();
    let fixtures = Fixtures::new();
    let file = create_putget_file(
        &storage,
        &SingleTask,
        "scenario_a",
        AccessPattern::Region,
        false,
        Flavor::NetCdf,
    )?;
    let var = file.variable(ElementKind::Int32).ok_or("missing variable")?;
    let fixture = fixtures.get(ElementKind::Int32);
    let bytes = fixture.array_bytes();
    storage.put_vara(file.dataset(), var, &START, &COUNT, ElementKind::Int32, bytes)?;
    storage.sync(file.dataset())?;
    storage.close(file.dataset())?;

    let dataset = storage.open(&SingleTask, Flavor::NetCdf, file.path(), OpenMode::ReadOnly)?;
    let bytes = storage.get_vara(dataset, var, &START, &COUNT, ElementKind::Int32)?;
    let elements: Vec<i32> = bytes_to_elements(&bytes).ok_or("misaligned read")?;
    assert_eq!(elements.len(), ARRAY_NUM_ELEMENTS);
    assert!(elements.iter().all(|&element| element == -10_000));
    storage.close(dataset)?;
    Ok(())
}

#[test]
fn scenario_single_uint64() -> Result<(), Box<dyn std::error::Error>> {
    let storage = memory_storage();
    let fixtures = Fixtures::new();
    let file = create_putget_file(
        &storage,
        &SingleTask,
        "scenario_b",
        AccessPattern::Single,
        false,
        Flavor::NetCdf4Parallel,
    )?;
    let var = file.variable(ElementKind::UInt64).ok_or("missing variable")?;
    let fixture = fixtures.get(ElementKind::UInt64);
    assert_eq!(fixture.scalar::<u64>(), Some(99_999_999_999));
    storage.put_var1(file.dataset(), var, &START, ElementKind::UInt64, fixture.scalar_bytes())?;
    storage.close(file.dataset())?;

    let dataset = storage.open(
        &SingleTask,
        Flavor::NetCdf4Parallel,
        file.path(),
        OpenMode::ReadOnly,
    )?;
    let bytes = storage.get_var1(dataset, var, &START, ElementKind::UInt64)?;
    assert_eq!(bytes, elements_to_bytes(&[99_999_999_999u64]));
    // the rest of the variable holds the fill value
    let bytes = storage.get_var1(dataset, var, &[0, 1, 0], ElementKind::UInt64)?;
    assert_ne!(bytes, elements_to_bytes(&[99_999_999_999u64]));
    storage.close(dataset)?;
    Ok(())
}

#[test]
fn scenario_unit_stride_matches_region() -> Result<(), Box<dyn std::error::Error>> {
    let storage = memory_storage();
    let fixtures = Fixtures::new();
    let kind = ElementKind::Float64;
    let fixture = fixtures.get(kind);

    let mut paths = Vec::new();
    for access in [AccessPattern::Region, AccessPattern::Strided] {
        let flavor = Flavor::PnetCdf;
        let file = create_putget_file(&storage, &SingleTask, "scenario_c", access, false, flavor)?;
        let var = file.variable(kind).ok_or("missing variable")?;
        match access {
            AccessPattern::Region => {
                let bytes = fixture.array_bytes();
                storage.put_vara(file.dataset(), var, &START, &COUNT, kind, bytes)?;
            }
            _ => {
                let bytes = fixture.array_bytes();
                storage.put_vars(file.dataset(), var, &START, &COUNT, &STRIDE, kind, bytes)?;
            }
        }
        storage.close(file.dataset())?;
        paths.push((file.path().to_string(), var));
    }

    let mut contents = Vec::new();
    for (path, var) in &paths {
        let dataset = storage.open(&SingleTask, Flavor::PnetCdf, path, OpenMode::ReadOnly)?;
        let region = storage.get_vara(dataset, *var, &START, &COUNT, kind)?;
        let strided = storage.get_vars(dataset, *var, &START, &COUNT, &STRIDE, kind)?;
        assert_eq!(region, strided);
        assert_eq!(storage.get_var(dataset, *var, kind)?, region);
        contents.push(region);
        storage.close(dataset)?;
    }
    assert_eq!(contents[0], contents[1]);
    assert_eq!(contents[0], fixture.array_bytes());
    Ok(())
}

#[test]
fn scenario_whole_unlimited_is_empty() -> Result<(), Box<dyn std::error::Error>> {
    let store: ReadableWritableListableStorage = Arc::new(MemoryStore::new());
    let storage = StoreDatasetStorage::new(store);
    let fixtures = Fixtures::new();
    let cell = MatrixCell {
        unlimited: true,
        access: AccessPattern::Whole,
        flavor: Flavor::NetCdf4Compressed,
    };
    let driver = PutGetDriver::new(&storage, &SingleTask, &fixtures).with_test_name("scenario_d");
    driver.run_cell(&cell)?;

    let path = putget_filename(
        driver.test_name(),
        cell.access,
        cell.unlimited,
        cell.flavor,
    );
    let dataset = storage.open(&SingleTask, cell.flavor, &path, OpenMode::ReadOnly)?;
    assert_eq!(storage.inq_dim_len(dataset, DimId::from(0))?, 0);
    for entry in ElementKind::tested_for(cell.flavor) {
        let var = VarId::from(entry.variable_index);
        assert!(storage.get_var(dataset, var, entry.kind)?.is_empty());
    }
    storage.close(dataset)?;
    Ok(())
}
