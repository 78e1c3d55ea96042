use std::sync::Arc;
use std::thread;

use shapemap_api::Mappable;
use shapemap_engine::{CacheMode, InsertPolicy, MapError, Mapper, MapperConfig, TypePairKey};

#[derive(Mappable, Clone, Default, Debug, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Mappable, Clone, Default, Debug, PartialEq)]
struct PointDto {
    x: i32,
    y: i32,
}

fn bounded(capacity: usize) -> Mapper {
    Mapper::with_options(
        CacheMode::Bounded { capacity },
        InsertPolicy::default(),
        true,
    )
    .unwrap()
}

fn cached_keys(mapper: &Mapper) -> Vec<TypePairKey> {
    mapper.snapshot().into_iter().map(|entry| entry.key).collect()
}

#[test]
fn overflow_evicts_first_pair_and_rebuilds_it_later() {
    let mapper = bounded(2);
    let _: u16 = mapper.map_value(&1u8).unwrap();
    let _: u32 = mapper.map_value(&1u8).unwrap();
    let _: u64 = mapper.map_value(&1u8).unwrap();

    assert_eq!(
        cached_keys(&mapper),
        vec![TypePairKey::of::<u8, u32>(), TypePairKey::of::<u8, u64>()]
    );
    let stats = mapper.stats();
    assert_eq!((stats.builds, stats.evictions, stats.entries), (3, 1, 2));

    let _: u16 = mapper.map_value(&1u8).unwrap();
    assert_eq!(mapper.stats().builds, 4);
    assert_eq!(
        cached_keys(&mapper),
        vec![TypePairKey::of::<u8, u64>(), TypePairKey::of::<u8, u16>()]
    );
}

#[test]
fn hits_do_not_refresh_eviction_order() {
    let mapper = bounded(2);
    let _: u16 = mapper.map_value(&1u8).unwrap();
    let _: u32 = mapper.map_value(&1u8).unwrap();
    for _ in 0..5 {
        let _: u16 = mapper.map_value(&1u8).unwrap();
    }
    assert_eq!(mapper.stats().hits, 5);

    let _: u64 = mapper.map_value(&1u8).unwrap();
    assert_eq!(
        cached_keys(&mapper),
        vec![TypePairKey::of::<u8, u32>(), TypePairKey::of::<u8, u64>()]
    );
}

#[test]
fn bypassing_the_cache_leaves_it_untouched() {
    let mapper = Mapper::new();
    let source = Point { x: 1, y: 2 };
    for _ in 0..3 {
        let dto = mapper
            .map_with::<Point, PointDto>(Some(&source), false)
            .unwrap();
        assert_eq!(dto, Some(PointDto { x: 1, y: 2 }));
    }
    assert!(mapper.snapshot().is_empty());
    let stats = mapper.stats();
    assert_eq!((stats.hits, stats.misses, stats.builds), (0, 0, 0));
}

#[test]
fn mode_switch_and_clear_drop_routines() {
    let mapper = Mapper::new();
    let _: PointDto = mapper.map_value(&Point::default()).unwrap();
    assert_eq!(mapper.snapshot().len(), 1);

    mapper.set_mode(CacheMode::Bounded { capacity: 8 }).unwrap();
    assert!(mapper.is_bounded());
    assert!(mapper.snapshot().is_empty());
    assert_eq!(mapper.stats().capacity, Some(8));

    let _: PointDto = mapper.map_value(&Point::default()).unwrap();
    mapper.clear();
    assert!(mapper.snapshot().is_empty());

    let err = mapper.set_mode(CacheMode::Bounded { capacity: 0 }).unwrap_err();
    assert!(matches!(err, MapError::Configuration(_)));
    assert_eq!(mapper.mode(), CacheMode::Bounded { capacity: 8 });
}

#[test]
fn routine_is_reusable_and_checks_its_pair() {
    let mapper = Mapper::new();
    let routine = mapper.routine::<Point, PointDto>().unwrap();
    assert_eq!(routine.key(), TypePairKey::of::<Point, PointDto>());
    let dto: PointDto = routine.invoke(&Point { x: 3, y: 4 }).unwrap();
    assert_eq!(dto, PointDto { x: 3, y: 4 });

    let err = routine.invoke::<Point, Point>(&Point::default()).unwrap_err();
    assert!(matches!(err, MapError::Configuration(_)));
}

#[test]
fn single_winner_hands_every_thread_the_same_routine() {
    let mapper = Mapper::with_options(CacheMode::Unbounded, InsertPolicy::SingleWinner, true)
        .unwrap();
    let routines: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| mapper.routine::<Point, PointDto>().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let stored = mapper.snapshot().remove(0).routine;
    assert!(routines.iter().all(|r| Arc::ptr_eq(r, &stored)));
    assert_eq!(mapper.snapshot().len(), 1);
}

#[test]
fn concurrent_mapping_stays_within_capacity() {
    let mapper = bounded(2);
    thread::scope(|s| {
        for t in 0..4u8 {
            let mapper = &mapper;
            s.spawn(move || {
                for i in 0..50u8 {
                    let v = t.wrapping_add(i);
                    let a: u16 = mapper.map_value(&v).unwrap();
                    let b: i64 = mapper.map_value(&v).unwrap();
                    let c: String = mapper.map_value(&v).unwrap();
                    assert_eq!(a as i64, b);
                    assert_eq!(c, v.to_string());
                }
            });
        }
    });
    assert!(mapper.snapshot().len() <= 2);
}

#[test]
fn mapper_from_toml_config() {
    let config = MapperConfig::parse(
        r#"
        [cache]
        mode = "bounded"
        capacity = 3
        policy = "single_winner"
        "#,
    )
    .unwrap();
    let mapper = Mapper::from_config(&config).unwrap();
    assert_eq!(mapper.mode(), CacheMode::Bounded { capacity: 3 });
    assert!(mapper.allow_recursion());

    let rejected = MapperConfig::parse("[cache]\nmode = \"bounded\"\ncapacity = 0").unwrap();
    assert!(matches!(
        Mapper::from_config(&rejected),
        Err(MapError::Configuration(_))
    ));
}
