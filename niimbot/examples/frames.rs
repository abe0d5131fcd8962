use niimbot::Bitmap;

fn main() {
    let bitmap = Bitmap::from_fn(16, 4, |x, y| x == y || x == 15 - y);
    let img = bitmap.encode(1).expect("cannot encode bitmap");

    for pkt in img.packets() {
        let line: Vec<String> = pkt.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
        println!("{}", line.join(" "));
    }
}
