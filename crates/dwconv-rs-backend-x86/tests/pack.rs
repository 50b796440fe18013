use dwconv_rs::ScheduleError;
use dwconv_rs_backend_x86::{pack_data, pack_kernel, unpack_data, unpack_kernel};
use proptest::prelude::*;

#[test]
fn data_pack_matches_index_formula() {
    // value encodes (n, c, h, w) so every position is distinguishable
    let shape = [2, 6, 3, 2];
    let data: Vec<u32> = (0..2 * 6 * 3 * 2).collect();
    let packed = pack_data(&data, shape, 3).unwrap();
    assert_eq!(packed.shape, vec![2, 2, 3, 2, 3]);
    assert_eq!(packed.block(), 3);

    let plain_at = |n: usize, c: usize, h: usize, w: usize| data[((n * 6 + c) * 3 + h) * 2 + w];
    let packed_at = |n: usize, cc: usize, h: usize, w: usize, cb: usize| {
        packed.data[(((n * 2 + cc) * 3 + h) * 2 + w) * 3 + cb]
    };
    for n in 0..2 {
        for c in 0..6 {
            for h in 0..3 {
                for w in 0..2 {
                    assert_eq!(packed_at(n, c / 3, h, w, c % 3), plain_at(n, c, h, w));
                }
            }
        }
    }
}

#[test]
fn kernel_pack_follows_channel_multiplier() {
    // (C=2, M=3, 1, 1): output channel oc reads kernel[oc / 3, oc % 3]
    let kernel: Vec<u32> = vec![10, 11, 12, 20, 21, 22];
    let packed = pack_kernel(&kernel, [2, 3, 1, 1], 2).unwrap();
    assert_eq!(packed.shape, vec![3, 1, 1, 1, 1, 2]);
    assert_eq!(packed.data, vec![10, 11, 12, 20, 21, 22]);

    let packed = pack_kernel(&kernel, [2, 3, 1, 1], 6).unwrap();
    assert_eq!(packed.shape, vec![1, 1, 1, 1, 1, 6]);
    assert_eq!(unpack_kernel(&packed, 3).unwrap(), kernel);
}

#[test]
fn pack_rejects_bad_blocks_and_lengths() {
    let data = vec![0f32; 24];
    assert!(matches!(
        pack_data(&data, [1, 6, 2, 2], 4),
        Err(ScheduleError::LayoutMismatch { .. })
    ));
    assert!(pack_data(&data, [1, 6, 2, 2], 0).is_err());
    assert!(pack_data(&data[1..], [1, 6, 2, 2], 3).is_err());
    assert!(pack_kernel(&[0f32; 9], [1, 1, 3, 3], 2).is_err());
}

fn plain_case() -> impl Strategy<Value = ([usize; 4], usize)> {
    (1usize..=2, 1usize..=4, 1usize..=4, 1usize..=4, 1usize..=4).prop_map(
        |(n, chunks, block, h, w)| ([n, chunks * block, h, w], block),
    )
}

fn kernel_case() -> impl Strategy<Value = ([usize; 4], usize)> {
    (1usize..=4, 1usize..=3, 1usize..=3, 1usize..=3).prop_flat_map(|(c, m, kh, kw)| {
        let out = c * m;
        let blocks: Vec<usize> = (1..=out).filter(|b| out % b == 0).collect();
        prop::sample::select(blocks).prop_map(move |block| ([c, m, kh, kw], block))
    })
}

proptest! {
    #[test]
    fn data_pack_round_trips((shape, block) in plain_case()) {
        let len: usize = shape.iter().product();
        let data: Vec<i64> = (0..len as i64).collect();
        let packed = pack_data(&data, shape, block).unwrap();
        prop_assert_eq!(packed.data.len(), len);
        prop_assert_eq!(unpack_data(&packed).unwrap(), data);
    }

    #[test]
    fn kernel_pack_round_trips((shape, block) in kernel_case()) {
        let len: usize = shape.iter().product();
        let kernel: Vec<i64> = (0..len as i64).map(|v| v * 7 - 3).collect();
        let packed = pack_kernel(&kernel, shape, block).unwrap();
        prop_assert_eq!(packed.shape[5], block);
        prop_assert_eq!(unpack_kernel(&packed, shape[1]).unwrap(), kernel);
    }
}
