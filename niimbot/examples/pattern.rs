use niimbot::{Bitmap, Model, Printer};

fn main() {
    let mut printer = Printer::find().expect("no printer found");

    // 8x8 checkerboard across the full D11 print head
    let bitmap = Bitmap::from_fn(96, 96, |x, y| (x / 8 + y / 8) % 2 == 0);

    printer
        .print(Model::D11, &bitmap, 3)
        .expect("failed to print pattern");
}
