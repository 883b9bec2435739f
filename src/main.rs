fn main() {
    excalidraw_preview::run();
}
