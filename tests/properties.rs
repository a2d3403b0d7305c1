use proptest::prelude::*;
use retouchfe::backend::BuiltinBackend;
use retouchfe::coords::{Point, Size, to_display, to_native};
use retouchfe::ops::InpaintMethod;
use retouchfe::ops::executor::{MASK_THRESHOLD, binarize_mask, execute};
use retouchfe::protocol::{InpaintParams, JobId, ProcessRequest};

fn image_and_mask() -> impl Strategy<Value = (u32, u32, Vec<u8>, Vec<u8>)> {
    (4u32..20, 4u32..20).prop_flat_map(|(w, h)| {
        let n = (w * h * 4) as usize;
        (
            Just(w),
            Just(h),
            prop::collection::vec(any::<u8>(), n),
            // sparse strokes: mostly zero, sometimes painted
            prop::collection::vec(prop_oneof![6 => Just(0u8), 1 => any::<u8>()], n),
        )
    })
}

fn params(method: InpaintMethod) -> InpaintParams {
    InpaintParams {
        method,
        radius: 3,
        patch_size: 5,
        iterations: 2,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn keep_pixels_round_trip_exactly(
        (w, h, image, mask) in image_and_mask(),
        patch in any::<bool>(),
    ) {
        let method = if patch { InpaintMethod::PatchMatch } else { InpaintMethod::Telea };
        let hole = binarize_mask(&mask);
        let resp = execute(&BuiltinBackend::new(), ProcessRequest {
            job: JobId::new(),
            image_pixels: image.clone(),
            mask_pixels: mask,
            width: w,
            height: h,
            params: params(method),
        });

        if hole.iter().all(|&m| m > 0) {
            prop_assert!(resp.result.is_err());
            return Ok(());
        }
        let out = resp.result.unwrap();
        prop_assert_eq!((out.width, out.height), (w, h));
        prop_assert_eq!(out.pixels.len(), image.len());
        for (i, &m) in hole.iter().enumerate() {
            let (got, want) = (&out.pixels[i * 4..i * 4 + 4], &image[i * 4..i * 4 + 4]);
            if m == 0 {
                prop_assert_eq!(got, want);
            } else {
                prop_assert_eq!(got[3], 255);
            }
        }
    }

    #[test]
    fn binarized_mask_is_strictly_binary(mask in prop::collection::vec(any::<u8>(), 0..256)) {
        let usable = mask.len() / 4 * 4;
        let bin = binarize_mask(&mask[..usable]);
        prop_assert_eq!(bin.len(), usable / 4);
        for (px, &b) in mask[..usable].chunks_exact(4).zip(&bin) {
            prop_assert!(b == 0 || b == 255);
            if px[..3].iter().all(|&c| c <= MASK_THRESHOLD) {
                prop_assert_eq!(b, 0);
            }
        }
    }

    #[test]
    fn display_native_round_trip(
        (dw, dh) in (1.0f32..2000.0, 1.0f32..2000.0),
        (nw, nh) in (1.0f32..8000.0, 1.0f32..8000.0),
        (fx, fy) in (0.0f32..1.0, 0.0f32..1.0),
    ) {
        let display = Size::new(dw, dh);
        let native = Size::new(nw, nh);
        let p = Point::new(fx * dw, fy * dh);
        let n = to_native(p, display, native).unwrap();
        let back = to_display(n, display, native).unwrap();
        prop_assert!((back.x - p.x).abs() <= 1e-3 * dw.max(1.0));
        prop_assert!((back.y - p.y).abs() <= 1e-3 * dh.max(1.0));
    }
}
