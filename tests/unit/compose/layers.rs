use super::*;

fn write_png(path: &Path, w: u32, h: u32, rgba: [u8; 4]) {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

#[test]
fn decode_layer_dimensions_and_premul() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    write_png(&path, 1, 1, [100, 50, 200, 128]);

    let layer = decode_layer(&path).unwrap();
    assert_eq!((layer.width, layer.height), (1, 1));
    assert_eq!(
        layer.rgba8_premul.as_slice(),
        &[
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128u8
        ]
    );
}

#[test]
fn decode_layer_reports_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.png");
    std::fs::write(&path, b"definitely not a png").unwrap();
    assert!(decode_layer(&path).is_err());
    assert!(decode_layer(&dir.path().join("absent.png")).is_err());
}

#[test]
fn cache_decodes_each_path_once() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_png(&a, 2, 2, [255, 0, 0, 255]);
    write_png(&b, 2, 2, [0, 255, 0, 255]);

    let mut cache = LayerCache::new();
    let first = cache.get_or_load(&a).unwrap();
    let again = cache.get_or_load(&a).unwrap();
    cache.get_or_load(&b).unwrap();

    assert!(Arc::ptr_eq(&first.rgba8_premul, &again.rgba8_premul));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.hits(), 1);
}
